//! Named entry points and capability strings the static analyzer reasons
//! about. Kept as plain slices rather than an enum so new entry points can
//! be recognized without a breaking type change.

pub const IBC_ENTRY_POINTS: &[&str] = &[
    "ibc_channel_open",
    "ibc_channel_connect",
    "ibc_channel_close",
    "ibc_packet_receive",
    "ibc_packet_ack",
    "ibc_packet_timeout",
    "ibc_source_callback",
    "ibc_destination_callback",
];

pub const REQUIRED_EXPORTS: &[&str] = &["allocate", "deallocate"];

pub fn required_capabilities_for(has_ibc_entry_points: bool) -> Vec<String> {
    if has_ibc_entry_points {
        vec!["iterator".to_string(), "stargate".to_string()]
    } else {
        Vec::new()
    }
}
