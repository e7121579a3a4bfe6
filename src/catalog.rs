//! Report-type catalog: opaque report ids to short coverage labels

/// Known report types of the `s_epi_complete` table, as (id, label)
pub const REPORT_TYPES: [(&str, &str); 5] = [
    ("28dd2c7955ce926456240b2ff0100bde", "1yr"),
    ("35f4a8d465e6e1edc05f3d8ab658c551", "2yr"),
    ("d1fe173d08e959397adf34b1d77e88d7", "3yr"),
    ("f033ab37c30201f73f142449d037028d", "5yr"),
    ("30f72fc853a2cc02ef953dc97f36f596", "7yr"),
];

/// Label for a report-type id, or `None` when the id is not catalogued
pub fn report_name(report_type_id: &str) -> Option<&'static str> {
    REPORT_TYPES
        .iter()
        .find(|(id, _)| *id == report_type_id)
        .map(|(_, label)| *label)
}
