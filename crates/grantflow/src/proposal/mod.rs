//! Proposal authoring — drafts, sections, collaborators, and the formatted
//! proposal code.

pub mod service;

pub use service::ProposalService;

/// Formats a proposal code: `{PREFIX}/{TEMPLATE}/{YEAR}/{SEQ:05}`.
///
/// The sequence number is zero-padded to five digits so codes sort
/// lexicographically within a template-year.
pub fn format_code(prefix: &str, template_code: &str, year: i32, seq: u32) -> String {
    format!("{}/{}/{}/{:05}", prefix, template_code, year, seq)
}
