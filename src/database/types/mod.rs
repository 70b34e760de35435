mod client;
mod draft;
mod owner;

pub use client::{Client, ClientKind, NewClient};
pub use draft::{EstimateDraft, NewEstimateDraft};
pub use owner::OwnerContext;
