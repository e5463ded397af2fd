pub(crate) mod captures;
mod digests;
pub(crate) mod summaries;
