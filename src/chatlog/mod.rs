pub mod archive;
pub mod audit;
pub mod client_dir;
pub mod clients;
pub mod config;
pub mod lock;
pub mod merge;
pub mod parser;
pub mod paths;
pub mod record;
pub mod storage;
pub mod sync;
pub mod util;
pub mod warn;
