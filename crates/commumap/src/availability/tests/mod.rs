pub(crate) mod common;

mod alerts;
