//! Socket-backed transport.
//!
//! Each handle owns one ICMP socket per address family, opened as RAW when
//! the process has the privilege and as unprivileged DGRAM otherwise. A
//! receiver thread per socket routes echo replies and destination-unreachable
//! messages to the probe waiting on that sequence number, so any number of
//! probes may be outstanding on one handle.

use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};
use rand::Rng;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::sync::oneshot;

use super::packet::{EchoPacket, Inbound, parse_inbound};
use super::{
    FatalErrorCallback, HandleConfig, ProbeFailure, ProbeHandle, ProbeReply, Transport, TransportError,
};
use crate::{dns, lock_unpoisoned as lock};

const RECV_POLL: Duration = Duration::from_millis(100);
const RECV_BUFFER: usize = 1500;

#[derive(Debug, Default, Clone, Copy)]
pub struct IcmpTransport;

impl IcmpTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for IcmpTransport {
    type Handle = IcmpHandle;

    fn create_handle(&self, config: &HandleConfig) -> Result<IcmpHandle, TransportError> {
        IcmpHandle::open(config.clone())
    }
}

enum Delivery {
    Reply { received_ms: u64 },
    Unreachable,
}

struct Channel {
    socket: Socket,
    raw: bool,
    is_ipv6: bool,
    pending: Mutex<HashMap<u16, oneshot::Sender<Delivery>>>,
}

impl Channel {
    fn open(is_ipv6: bool) -> std::io::Result<Self> {
        let (domain, protocol) = if is_ipv6 {
            (Domain::IPV6, Protocol::ICMPV6)
        } else {
            (Domain::IPV4, Protocol::ICMPV4)
        };

        let (socket, raw) = match Socket::new(domain, Type::RAW, Some(protocol)) {
            Ok(socket) => (socket, true),
            Err(e) => {
                debug!("Raw ICMP socket unavailable ({}), trying unprivileged datagram socket", e);
                (Socket::new(domain, Type::DGRAM, Some(protocol))?, false)
            }
        };
        socket.set_read_timeout(Some(RECV_POLL))?;

        Ok(Self {
            socket,
            raw,
            is_ipv6,
            pending: Mutex::new(HashMap::new()),
        })
    }

    fn register(&self, sequence: u16) -> oneshot::Receiver<Delivery> {
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(sequence, tx);
        rx
    }

    fn forget(&self, sequence: u16) {
        lock(&self.pending).remove(&sequence);
    }

    fn deliver(&self, inbound: Inbound, identifier: u16, received_ms: u64) {
        // DGRAM sockets rewrite the identifier and filter replies in the kernel
        if self.raw && inbound.identifier() != identifier {
            return;
        }
        let Some(tx) = lock(&self.pending).remove(&inbound.sequence()) else {
            return;
        };
        let delivery = match inbound {
            Inbound::EchoReply { .. } => Delivery::Reply { received_ms },
            Inbound::Unreachable { .. } => Delivery::Unreachable,
        };
        let _ = tx.send(delivery);
    }

    fn drop_pending(&self) {
        lock(&self.pending).clear();
    }
}

struct Shared {
    epoch: Instant,
    identifier: u16,
    sequence: AtomicU16,
    closed: AtomicBool,
    broken: AtomicBool,
    fatal_callbacks: Mutex<Vec<FatalErrorCallback>>,
    resolved: Mutex<HashMap<String, IpAddr>>,
}

impl Shared {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn next_sequence(&self) -> u16 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn raise_fatal(&self, err: TransportError) {
        self.broken.store(true, Ordering::SeqCst);
        for callback in lock(&self.fatal_callbacks).iter() {
            callback(&err);
        }
    }
}

pub struct IcmpHandle {
    config: HandleConfig,
    shared: Arc<Shared>,
    v4: Arc<Channel>,
    v6: Mutex<Option<Arc<Channel>>>,
}

impl IcmpHandle {
    pub fn open(config: HandleConfig) -> Result<Self, TransportError> {
        let shared = Arc::new(Shared {
            epoch: Instant::now(),
            identifier: rand::thread_rng().gen_range(1..=u16::MAX),
            sequence: AtomicU16::new(1),
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            fatal_callbacks: Mutex::new(Vec::new()),
            resolved: Mutex::new(HashMap::new()),
        });
        let v4 = open_channel(false, &shared)?;
        info!(
            "Opened ICMP handle (identifier {}, {} socket, timeout {}ms)",
            shared.identifier,
            if v4.raw { "raw" } else { "datagram" },
            config.timeout_ms
        );

        Ok(Self {
            config,
            shared,
            v4,
            v6: Mutex::new(None),
        })
    }

    fn channel_for(&self, ip: IpAddr) -> Result<Arc<Channel>, TransportError> {
        if ip.is_ipv4() {
            return Ok(self.v4.clone());
        }
        let mut v6 = lock(&self.v6);
        if let Some(channel) = v6.as_ref() {
            return Ok(channel.clone());
        }
        let channel = open_channel(true, &self.shared)?;
        *v6 = Some(channel.clone());
        Ok(channel)
    }

    async fn resolve(&self, target: &str) -> anyhow::Result<IpAddr> {
        let cached = lock(&self.shared.resolved).get(target).copied();
        if let Some(ip) = cached {
            return Ok(ip);
        }
        let ip = dns::resolve_target(target).await?;
        lock(&self.shared.resolved).insert(target.to_string(), ip);
        Ok(ip)
    }
}

impl ProbeHandle for IcmpHandle {
    async fn probe(&self, target: &str) -> ProbeReply {
        if self.shared.closed.load(Ordering::SeqCst) {
            return ProbeReply::failed(ProbeFailure::Other("handle is closed".to_string()));
        }
        if self.shared.broken.load(Ordering::SeqCst) {
            return ProbeReply::failed(ProbeFailure::Other("receiver stopped".to_string()));
        }

        let ip = match self.resolve(target).await {
            Ok(ip) => ip,
            Err(e) => {
                debug!("Cannot resolve {}: {}", target, e);
                return ProbeReply::failed(ProbeFailure::DestinationUnreachable);
            }
        };
        let channel = match self.channel_for(ip) {
            Ok(channel) => channel,
            Err(e) => return ProbeReply::failed(ProbeFailure::Other(e.to_string())),
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let destination: SockAddr = SocketAddr::new(ip, 0).into();

        for attempt in 0..=self.config.retries {
            let sequence = self.shared.next_sequence();
            let rx = channel.register(sequence);
            let packet = EchoPacket::echo_request(
                self.shared.identifier,
                sequence,
                self.config.packet_size,
                channel.is_ipv6,
            );

            let sent_ms = self.shared.now_ms();
            if let Err(e) = channel.socket.send_to(&packet.to_bytes(), &destination) {
                channel.forget(sequence);
                return ProbeReply::failed(ProbeFailure::Other(format!("failed to send echo request: {}", e)));
            }
            debug!("Sent echo request to {} (seq {}, attempt {})", ip, sequence, attempt + 1);

            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(Delivery::Reply { received_ms })) => return ProbeReply::success(sent_ms, received_ms),
                Ok(Ok(Delivery::Unreachable)) => {
                    return ProbeReply {
                        error: Some(ProbeFailure::DestinationUnreachable),
                        sent_ms: Some(sent_ms),
                        received_ms: None,
                    };
                }
                Ok(Err(_)) => {
                    return ProbeReply::failed(ProbeFailure::Other(
                        "transport closed while waiting for a reply".to_string(),
                    ));
                }
                Err(_) => channel.forget(sequence),
            }
        }

        ProbeReply::failed(ProbeFailure::TimedOut)
    }

    fn on_fatal_error(&self, callback: FatalErrorCallback) {
        lock(&self.shared.fatal_callbacks).push(callback);
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.v4.drop_pending();
        if let Some(v6) = lock(&self.v6).as_ref() {
            v6.drop_pending();
        }
        debug!("Closed ICMP handle (identifier {})", self.shared.identifier);
    }
}

impl Drop for IcmpHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_channel(is_ipv6: bool, shared: &Arc<Shared>) -> Result<Arc<Channel>, TransportError> {
    let channel = Arc::new(Channel::open(is_ipv6)?);
    let receiver = channel.clone();
    let shared = shared.clone();

    thread::Builder::new()
        .name("icmp-recv".to_string())
        .spawn(move || receive_loop(&receiver, &shared))?;

    Ok(channel)
}

fn receive_loop(channel: &Channel, shared: &Shared) {
    let mut buffer = [0u8; RECV_BUFFER];

    while !shared.closed.load(Ordering::SeqCst) {
        match (&channel.socket).read(&mut buffer) {
            Ok(len) => {
                let received_ms = shared.now_ms();
                if let Some(inbound) = parse_inbound(&buffer[..len], channel.is_ipv6) {
                    channel.deliver(inbound, shared.identifier, received_ms);
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
            Err(e) => {
                if shared.closed.load(Ordering::SeqCst) {
                    break;
                }
                error!("ICMP receive failed: {}", e);
                channel.drop_pending();
                shared.raise_fatal(TransportError::Fatal(format!("receive failed: {}", e)));
                break;
            }
        }
    }
}
