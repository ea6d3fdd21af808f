//! marketflow CLI library: command implementations shared by the
//! `marketflow` binary and its integration tests.

pub mod commands;
