pub mod audit;
pub mod config;
pub mod envelope;
pub mod exchange;
pub mod import;
pub mod keys;
pub mod lock;
pub mod paths;
pub mod project;
pub mod quota;
pub mod sync;
pub mod tokens;
pub mod transcript;
pub mod util;
pub mod warn;
