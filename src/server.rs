use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{error, info, warn};

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::StartupError;
use crate::handler::{self, Outcome};
use crate::MAX_PACKET_SIZE;

// One inbound datagram, handed from the receive loop to a worker.
struct Job {
    data: Vec<u8>,
    source: SocketAddr,
}

/// The UDP front of the proxy: owns the bound client-facing socket, the
/// shared response cache and the worker pool that handles queries.
pub struct Server {
    socket: UdpSocket,
    config: Arc<Config>,
    cache: Arc<ResponseCache>,
}

impl Server {
    /// Binds the configured address. Failing to bind is fatal by design;
    /// the caller gets a `StartupError` to log before exiting.
    pub fn bind(config: Config) -> Result<Server, StartupError> {
        let socket = UdpSocket::bind(config.bind_addr).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                StartupError::BindPermission {
                    addr: config.bind_addr,
                }
            } else {
                StartupError::Bind {
                    addr: config.bind_addr,
                    source: e,
                }
            }
        })?;

        Ok(Server {
            socket,
            config: Arc::new(config),
            cache: Arc::new(ResponseCache::new()),
        })
    }

    /// The address actually bound, which differs from the configured one
    /// when port 0 was requested.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves queries until the process exits.
    ///
    /// A fixed pool of workers drains a queue fed by the receive loop, so
    /// the loop itself never waits on upstream traffic: it reads one
    /// datagram, enqueues it and immediately reads the next. Per-datagram
    /// receive errors are logged and skipped, they never end the loop.
    pub fn run(self) -> Result<(), StartupError> {
        info!("listening on {}", self.local_addr().map_err(StartupError::Socket)?);

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        for id in 0..self.config.workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let cache = Arc::clone(&self.cache);
            let config = Arc::clone(&self.config);
            let reply_socket = self.socket.try_clone().map_err(StartupError::Socket)?;

            thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(receiver, reply_socket, cache, config))
                .map_err(StartupError::Socket)?;
        }

        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((size, source)) => {
                    let job = Job {
                        data: buf[..size].to_vec(),
                        source,
                    };
                    if sender.send(job).is_err() {
                        error!("all workers are gone, stopping the listener");
                        return Ok(());
                    }
                }
                Err(e) => warn!("receive error: {}", e),
            }
        }
    }
}

// Pulls jobs until the listener goes away. Every handler failure is caught
// here: logged with the source address, query dropped, loop continues.
fn worker_loop(
    receiver: Arc<Mutex<Receiver<Job>>>,
    reply_socket: UdpSocket,
    cache: Arc<ResponseCache>,
    config: Arc<Config>,
) {
    loop {
        let job = {
            let queue = match receiver.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            queue.recv()
        };
        let job = match job {
            Ok(job) => job,
            Err(_) => return,
        };

        match handler::handle_query(&job.data, job.source, &reply_socket, &cache, &config) {
            Ok(Outcome::Replied) | Ok(Outcome::Dropped) => {}
            Err(e) => warn!("dropping query from {}: {}", job.source, e),
        }
    }
}
