pub mod app;
pub mod chat;
pub mod persistence;
pub mod settings;
pub mod view;

#[cfg(test)]
pub(crate) mod test_support;
