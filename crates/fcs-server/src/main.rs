use clap::Parser;
use fcs_server::{logging, ServerConfig};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let config = match ServerConfig::try_parse() {
        Ok(c) => c,
        // --help and --version go to stdout and are not failures
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            std::process::exit(0);
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };
    if let Err(e) = logging::init_tracing(&config) {
        eprintln!("fatal: logging setup failed: {e:#}");
        std::process::exit(1);
    }

    let code = match fcs_server::serve(config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fcs-server stopped");
            eprintln!("fatal: {e:#}");
            1
        }
    };
    std::process::exit(code);
}
