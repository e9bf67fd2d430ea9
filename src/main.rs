mod classifier;
mod cli;
mod config;
mod debounce;
mod error;
mod gestures;
mod ipc;
mod logging;
mod questions;
mod quiz;
mod replay;
mod sampler;
mod store;
mod student;
mod video;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
