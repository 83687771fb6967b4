pub mod build_cmd;
pub mod inspect_cmd;
pub mod query_cmd;

pub use build_cmd::cmd_build;
pub use inspect_cmd::cmd_inspect;
pub use query_cmd::cmd_query;
