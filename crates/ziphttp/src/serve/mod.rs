//! Server lifecycle: listener setup from a `proto:addr` spec, the accept
//! loop with a thread per connection, signal driven reload and shutdown,
//! and the optional archive file watcher.

pub mod handler;
pub mod http;
pub mod index;

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use log::{error, info};
use notify::{RecursiveMode, Watcher};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::global::error::*;
use crate::serve::handler::{HandlerConfig, HandlerSources, ZipHandler};
use crate::serve::http::{serve_connection, SetTimeouts, Timeouts};

/// Everything `webserver` can be told.
pub struct ServeOptions {
	/// `proto:addr`; `unix`, `tcp`, `tcp4` and `tcp6` are recognized,
	/// anything else is treated as a tcp address
	pub listen: String,
	/// further archives extending the name space
	pub additional: Vec<PathBuf>,
	pub index_name: String,
	pub dir_redirect: bool,
	pub strip_prefix: String,
	pub add_prefix: String,
	pub timeouts: Timeouts,
	pub in_memory: bool,
	/// raw `K:V` response header specs, validated at startup
	pub headers: Vec<String>,
	pub auto_reload: bool,
	pub support_gz: bool,
}

impl Default for ServeOptions {
	fn default() -> ServeOptions {
		ServeOptions {
			listen: ":3000".into(),
			additional: Vec::new(),
			index_name: "index.html".into(),
			dir_redirect: false,
			strip_prefix: String::new(),
			add_prefix: String::new(),
			timeouts: Timeouts::default(),
			in_memory: false,
			headers: Vec::new(),
			auto_reload: false,
			support_gz: false,
		}
	}
}

enum Listener {
	Tcp(TcpListener),
	Unix(UnixListener, PathBuf),
}

pub(crate) enum Stream {
	Tcp(TcpStream),
	Unix(UnixStream),
}

impl Read for Stream {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		match self {
			Stream::Tcp(s) => s.read(buf),
			Stream::Unix(s) => s.read(buf),
		}
	}
}

impl Write for Stream {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self {
			Stream::Tcp(s) => s.write(buf),
			Stream::Unix(s) => s.write(buf),
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self {
			Stream::Tcp(s) => s.flush(),
			Stream::Unix(s) => s.flush(),
		}
	}
}

impl SetTimeouts for Stream {
	fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
		match self {
			Stream::Tcp(s) => s.set_read_timeout(timeout),
			Stream::Unix(s) => s.set_read_timeout(timeout),
		}
	}

	fn set_write_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
		match self {
			Stream::Tcp(s) => s.set_write_timeout(timeout),
			Stream::Unix(s) => s.set_write_timeout(timeout),
		}
	}
}

impl Stream {
	fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
		match self {
			Stream::Tcp(s) => s.set_nonblocking(nonblocking),
			Stream::Unix(s) => s.set_nonblocking(nonblocking),
		}
	}
}

impl Listener {
	fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
		match self {
			Listener::Tcp(l) => l.set_nonblocking(nonblocking),
			Listener::Unix(l, _) => l.set_nonblocking(nonblocking),
		}
	}

	fn accept(&self) -> io::Result<(Stream, String)> {
		match self {
			Listener::Tcp(l) => {
				let (stream, peer) = l.accept()?;
				Ok((Stream::Tcp(stream), peer.to_string()))
			},
			Listener::Unix(l, path) => {
				let (stream, _) = l.accept()?;
				Ok((Stream::Unix(stream), format!("unix:{}", path.display())))
			},
		}
	}

	fn describe(&self) -> String {
		match self {
			Listener::Tcp(l) => l
				.local_addr()
				.map(|a| a.to_string())
				.unwrap_or_else(|_| "tcp:?".into()),
			Listener::Unix(_, path) => format!("unix:{}", path.display()),
		}
	}
}

/// Parses the listen spec and binds. Unknown protocols default to tcp.
fn do_listen(spec: &str) -> InternalResult<Listener> {
	let (proto, addr) = match spec.split_once(':') {
		Some((proto @ ("unix" | "tcp" | "tcp4" | "tcp6"), rest)) => (proto, rest.to_string()),
		_ => ("tcp", spec.to_string()),
	};
	if proto == "unix" {
		let listener = UnixListener::bind(&addr)
			.map_err(|err| InternalError::InvalidConfig(format!("listen {}: {}", spec, err)))?;
		return Ok(Listener::Unix(listener, PathBuf::from(addr)));
	}
	let full = if addr.starts_with(':') {
		match proto {
			"tcp6" => format!("[::]{}", addr),
			_ => format!("0.0.0.0{}", addr),
		}
	} else {
		addr
	};
	let candidates: Vec<SocketAddr> = full
		.to_socket_addrs()
		.map_err(|err| InternalError::InvalidConfig(format!("listen {}: {}", spec, err)))?
		.filter(|a| match proto {
			"tcp4" => a.is_ipv4(),
			"tcp6" => a.is_ipv6(),
			_ => true,
		})
		.collect();
	if candidates.is_empty() {
		return Err(InternalError::InvalidConfig(format!("listen {}: no usable address", spec)));
	}
	let listener = TcpListener::bind(candidates.as_slice())
		.map_err(|err| InternalError::InvalidConfig(format!("listen {}: {}", spec, err)))?;
	Ok(Listener::Tcp(listener))
}

/// Counts in-flight connections so shutdown can drain them all.
#[derive(Clone)]
struct WaitGroup(Arc<(Mutex<usize>, Condvar)>);

struct WaitGuard(Arc<(Mutex<usize>, Condvar)>);

impl WaitGroup {
	fn new() -> WaitGroup {
		WaitGroup(Arc::new((Mutex::new(0), Condvar::new())))
	}

	fn enter(&self) -> WaitGuard {
		let (count, _) = &*self.0;
		*count.lock().unwrap() += 1;
		WaitGuard(self.0.clone())
	}

	fn wait(&self) {
		let (count, signal) = &*self.0;
		let mut guard = count.lock().unwrap();
		while *guard > 0 {
			guard = signal.wait(guard).unwrap();
		}
	}
}

impl Drop for WaitGuard {
	fn drop(&mut self) {
		let (count, signal) = &*self.0;
		*count.lock().unwrap() -= 1;
		signal.notify_all();
	}
}

/// Boots the server and blocks until SIGINT or SIGTERM. SIGHUP swaps in a
/// freshly indexed archive; with `auto_reload` a write to the primary
/// archive file does the same.
pub fn run(archive: PathBuf, options: ServeOptions) -> InternalResult {
	let mut headers = Vec::with_capacity(options.headers.len());
	for spec in &options.headers {
		match spec.split_once(':') {
			Some((name, value)) => headers.push((name.to_string(), value.trim().to_string())),
			None => {
				error!("invalid header spec: header={}", spec);
				return Err(InternalError::InvalidConfig(format!("invalid header: {}", spec)));
			},
		}
	}

	let sources = HandlerSources {
		archive: archive.clone(),
		additional: options.additional.clone(),
		in_memory: options.in_memory,
	};
	let config = HandlerConfig {
		strip_prefix: options.strip_prefix.clone(),
		add_prefix: options.add_prefix.clone(),
		index_name: options.index_name.clone(),
		dir_redirect: options.dir_redirect,
		support_gz: options.support_gz,
		headers,
	};
	let handler = Arc::new(ZipHandler::new(config, &sources)?);
	let shutdown = Arc::new(AtomicBool::new(false));

	let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM])?;
	{
		let handler = handler.clone();
		let shutdown = shutdown.clone();
		let sources = sources.clone();
		thread::spawn(move || {
			for signal in signals.forever() {
				info!("caught signal: signal={}", signal);
				match signal {
					SIGHUP => {
						info!(
							"reloading archive: name={} inmemory={}",
							sources.archive.display(),
							sources.in_memory
						);
						if let Err(err) = handler.reload(&sources) {
							error!("reload failed: error={}", err);
						}
					},
					_ => {
						shutdown.store(true, Ordering::SeqCst);
						break;
					},
				}
			}
		});
	}

	// kept alive for the whole serve loop, dropping it stops the watch
	let mut _watcher = None;
	if options.auto_reload {
		let (events_tx, events_rx) = std::sync::mpsc::channel();
		let mut watcher = notify::recommended_watcher(move |event| {
			let _ = events_tx.send(event);
		})
		.map_err(|err| InternalError::InvalidConfig(format!("watcher: {}", err)))?;
		watcher
			.watch(&archive, RecursiveMode::NonRecursive)
			.map_err(|err| InternalError::InvalidConfig(format!("watcher add: {}", err)))?;
		let handler = handler.clone();
		let sources = sources.clone();
		thread::spawn(move || {
			for event in events_rx {
				match event {
					Ok(event) => {
						info!("got watcher event: event={:?}", event.kind);
						if event.kind.is_modify() {
							info!("modified: name={}", sources.archive.display());
							if let Err(err) = handler.reload(&sources) {
								error!("reload error: error={}", err);
							}
						}
					},
					Err(err) => info!("got watcher error: error={}", err),
				}
			}
		});
		_watcher = Some(watcher);
	}

	let listener = do_listen(&options.listen)?;
	listener.set_nonblocking(true)?;
	info!("server starting: listen={} pid={}", listener.describe(), std::process::id());

	let connections = WaitGroup::new();
	let timeouts = options.timeouts;
	while !shutdown.load(Ordering::SeqCst) {
		match listener.accept() {
			Ok((mut stream, remote)) => {
				if let Err(err) = stream.set_nonblocking(false) {
					error!("accept: error={}", err);
					continue;
				}
				let handler = handler.clone();
				let guard = connections.enter();
				thread::spawn(move || {
					let _guard = guard;
					serve_connection(&mut stream, &remote, timeouts, |request, response| {
						handler.serve(request, response)
					});
				});
			},
			Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
				thread::sleep(Duration::from_millis(50));
			},
			Err(err) => {
				error!("accept: error={}", err);
				thread::sleep(Duration::from_millis(50));
			},
		}
	}

	info!("server closed, draining in-flight requests");
	connections.wait();
	if let Listener::Unix(_, path) = &listener {
		let _ = std::fs::remove_file(path);
	}
	Ok(())
}
