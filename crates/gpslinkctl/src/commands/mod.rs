//! Command implementations, one module per subcommand.

pub mod activate;
pub mod install;
pub mod restart;
pub mod run;
pub mod status;
pub mod uninstall;
