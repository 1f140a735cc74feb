use std::io::{self, BufRead, Write};
use std::net::{IpAddr, SocketAddr};
use std::thread;
use std::time::Duration;

use log::{error, info};
use structopt::StructOpt;

use dnsrelay::propagation::run_propagation_test;
use dnsrelay::server::Server;
use dnsrelay::Config;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dnsrelay",
    about = "Caching DNS forwarding proxy with a propagation checker"
)]
struct Opt {
    /// Address to listen on
    #[structopt(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on (53 needs root)
    #[structopt(short, long, default_value = "53")]
    port: u16,

    /// Upstream resolver queries are forwarded to
    #[structopt(short, long, default_value = "8.8.8.8:53")]
    upstream: SocketAddr,

    /// Seconds to wait for an upstream reply
    #[structopt(long, default_value = "3")]
    timeout: u64,

    /// Cache lifetime in seconds for replies without answers
    #[structopt(long, default_value = "60")]
    default_ttl: u64,

    /// Worker threads handling queries
    #[structopt(short, long, default_value = "8")]
    workers: usize,
}

impl Opt {
    fn into_config(self) -> Config {
        Config {
            bind_addr: SocketAddr::new(self.host, self.port),
            upstream_addr: self.upstream,
            upstream_timeout: Duration::from_secs(self.timeout),
            default_ttl: self.default_ttl,
            workers: self.workers,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    let config = opt.into_config();
    info!("forwarding misses to {}", config.upstream_addr);

    // Bind failures are fatal: no retry, no fallback port.
    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    thread::spawn(move || {
        if let Err(e) = server.run() {
            error!("server stopped: {}", e);
        }
    });

    println!("Server is running in the background.");
    println!("Type a domain name to run a propagation test, or 'quit' to exit.");

    let stdin = io::stdin();
    loop {
        print!("\ndnsrelay> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            domain => run_propagation_test(domain),
        }
    }

    println!("Shutting down.");
    Ok(())
}
