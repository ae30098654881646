#![no_main]

use libfuzzer_sys::fuzz_target;
use mysql_protocol::{
    CapabilityFlags, ColumnDefinition, ErrPacket, ExtendedCapabilityFlags, OkPacket, PrepareOk,
    ResultHeader,
};

fuzz_target!(|data: &[u8]| {
    let Some((&flags, payload)) = data.split_first() else {
        return;
    };

    let mut capabilities = CapabilityFlags::PROTOCOL_41 | CapabilityFlags::SESSION_TRACK;
    if flags & 1 != 0 {
        capabilities |= CapabilityFlags::DEPRECATE_EOF;
    }
    let ext = if flags & 2 != 0 {
        ExtendedCapabilityFlags::CACHE_METADATA
    } else {
        ExtendedCapabilityFlags::empty()
    };

    let _ = ResultHeader::decode(payload, capabilities, ext);
    let _ = OkPacket::decode(payload, capabilities);
    let _ = ErrPacket::decode(payload, capabilities);
    let _ = ColumnDefinition::decode(payload);
    let _ = PrepareOk::decode(payload);
});
