pub mod clients;
pub mod drafts;
