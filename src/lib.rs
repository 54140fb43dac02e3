//! BundlePush - Over-the-air bundle update engine
//! Library used by host runtimes and the `bundlepush-cli` binary

pub mod engine;
