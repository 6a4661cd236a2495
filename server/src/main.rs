use clap::Parser;
use log::error;
use server::config::{Options, USAGE};
use server::network::Server;
use std::process;

#[tokio::main]
async fn main() {
    let options = match Options::try_parse() {
        Ok(options) => options,
        Err(_) => {
            println!("{}", USAGE);
            process::exit(1);
        }
    };

    env_logger::init();

    let mut server = match Server::bind(&options).await {
        Ok(server) => server,
        Err(e) => {
            error!("failed to set up UDP socket on port {}: {}", options.port, e);
            process::exit(1);
        }
    };
    if let Err(e) = server.run().await {
        error!("fatal transport error: {}", e);
        process::exit(1);
    }
}
