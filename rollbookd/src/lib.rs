pub mod control;
pub mod daemon;
pub mod local;
pub mod net;
pub mod state;
pub mod sync;
pub mod watch;
