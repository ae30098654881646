#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use mysql_codec::PacketCodec;
use mysql_protocol::PacketHeader;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut cursor = data;
    let _ = PacketHeader::decode(&mut cursor);

    // Drive the framing decoder until it stalls or errors.
    let mut codec = PacketCodec::new().with_max_packet_size(1 << 20);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
});
