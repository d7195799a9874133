#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use spdy2http::config::GlobalOptions;
use spdy2http::server;
use std::process::ExitCode;

fn main() -> ExitCode {
    let opts = match GlobalOptions::from_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("spdy2http: {e}");
            return ExitCode::FAILURE;
        }
    };

    let worker_threads = server::runtime::get_container_cpu_limit();
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("spdy2http: failed to start tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(server::bootstrap::run(opts)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("spdy2http: {e}");
            ExitCode::FAILURE
        }
    }
}
