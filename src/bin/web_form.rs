//! web_form - serve the run form on a local address until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use fishcount::config::Defaults;
use fishcount::web::WebServer;
use fishcount::StopSignal;

#[derive(Parser, Debug)]
#[command(name = "web_form", about = "Serve a form that launches detection runs")]
struct Args {
    /// Listen address (defaults to the configured web_addr, 127.0.0.1:8000)
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let defaults = Defaults::load()?;
    let addr = args.addr.unwrap_or_else(|| defaults.web_addr.clone());

    let stop = StopSignal::new();
    stop.install_handlers(false)?;

    let handle = WebServer::new(addr, defaults).spawn()?;
    log::info!("web form listening on http://{}", handle.addr);
    while !stop.is_requested() {
        std::thread::sleep(Duration::from_millis(200));
    }
    log::info!("shutting down web form");
    handle.stop()
}
