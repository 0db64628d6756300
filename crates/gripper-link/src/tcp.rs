//! TCP 传输
//!
//! - [`TcpLink`]：客户端链路，每个请求同步等待一个响应（带读写超时）
//! - [`LinkServer`]：服务端，把任意 `ActuatorLink` 独占地交给一个客户端
//!
//! 同一时刻只有一个客户端（也就是一个 Sequencer）能驱动夹爪，其它连接收到 `busy` 问候后被关闭。
//! 报文格式见 [`gripper_protocol::wire`]。

use crate::{ActuatorLink, LinkError};
use gripper_protocol::wire::UNKNOWN_REQUEST_ID;
use gripper_protocol::{GripperState, LinkTarget, WireRequest, WireResponse};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 服务端检查退出标志的间隔
const SERVER_TICK: Duration = Duration::from_millis(20);

/// 一条已完成问候的连接
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn open(peer: SocketAddr, io_timeout: Duration) -> Result<Self, LinkError> {
        let stream = TcpStream::connect_timeout(&peer, io_timeout)
            .map_err(|e| LinkError::Unreachable(format!("{}: {}", peer, e)))?;
        stream.set_read_timeout(Some(io_timeout))?;
        stream.set_write_timeout(Some(io_timeout))?;
        stream.set_nodelay(true)?;

        let writer = stream.try_clone()?;
        let mut conn = Self {
            reader: BufReader::new(stream),
            writer,
        };
        match conn.read_message()? {
            WireResponse::Ready => Ok(conn),
            WireResponse::Busy { holder } => Err(LinkError::InUse(holder)),
            other => Err(LinkError::Protocol(format!(
                "unexpected greeting: {:?}",
                other
            ))),
        }
    }

    fn write_request(&mut self, request: &WireRequest) -> Result<(), LinkError> {
        let mut line =
            serde_json::to_string(request).map_err(|e| LinkError::Protocol(e.to_string()))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_message(&mut self) -> Result<WireResponse, LinkError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(LinkError::Disconnected);
        }
        serde_json::from_str(line.trim_end()).map_err(|e| LinkError::Protocol(e.to_string()))
    }
}

/// TCP 客户端链路
///
/// 读超时只影响当前请求：迟到的回复按 `id` 丢弃。
/// 其它错误之后流的状态不可信，连接被丢弃，下一个请求时重新连接。
pub struct TcpLink {
    peer: SocketAddr,
    io_timeout: Duration,
    conn: Option<Connection>,
    next_id: u64,
}

impl TcpLink {
    /// 连接到夹爪服务
    ///
    /// # 参数
    /// - `addr`: 服务地址（如 `"127.0.0.1:18890"`）
    /// - `io_timeout`: 连接、读、写超时
    ///
    /// # 错误
    /// - `LinkError::Unreachable`: 地址无法解析或连接失败
    /// - `LinkError::InUse`: 夹爪已被另一个客户端占用
    pub fn connect(addr: &str, io_timeout: Duration) -> Result<Self, LinkError> {
        let peer = addr
            .to_socket_addrs()
            .map_err(|e| LinkError::Unreachable(format!("{}: {}", addr, e)))?
            .next()
            .ok_or_else(|| LinkError::Unreachable(format!("{}: no address resolved", addr)))?;

        let conn = Connection::open(peer, io_timeout)?;
        info!("Connected to gripper service at {}", peer);

        Ok(Self {
            peer,
            io_timeout,
            conn: Some(conn),
            next_id: UNKNOWN_REQUEST_ID,
        })
    }

    /// 对端地址
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// 当前是否持有可用连接
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn request(
        &mut self,
        build: impl FnOnce(u64) -> WireRequest,
    ) -> Result<WireResponse, LinkError> {
        self.next_id += 1;
        let request = build(self.next_id);

        let result = self.exchange(&request);
        if let Err(e) = &result
            && *e != LinkError::Timeout
            && self.conn.take().is_some()
        {
            warn!("Dropping connection to {} after error: {}", self.peer, e);
        }
        result
    }

    fn exchange(&mut self, request: &WireRequest) -> Result<WireResponse, LinkError> {
        if self.conn.is_none() {
            self.conn = Some(Connection::open(self.peer, self.io_timeout)?);
            info!("Reconnected to gripper service at {}", self.peer);
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(LinkError::Disconnected);
        };

        if let Err(e) = conn.write_request(request) {
            // 请求可能只写出一半
            self.conn = None;
            return Err(e);
        }

        let deadline = Instant::now() + self.io_timeout;
        loop {
            let reply = conn.read_message()?;
            if reply.id() == Some(request.id()) {
                return Ok(reply);
            }
            debug!(
                "Discarding reply {:?} while waiting for request #{}",
                reply,
                request.id()
            );
            if Instant::now() >= deadline {
                return Err(LinkError::Timeout);
            }
        }
    }
}

impl ActuatorLink for TcpLink {
    fn send(&mut self, target: LinkTarget) -> Result<(), LinkError> {
        match self.request(|id| WireRequest::Command { id, target })? {
            WireResponse::Ack { .. } => Ok(()),
            WireResponse::Error { message, .. } => Err(LinkError::Remote(message)),
            other => Err(LinkError::Protocol(format!(
                "unexpected reply to command: {:?}",
                other
            ))),
        }
    }

    fn poll(&mut self) -> Result<GripperState, LinkError> {
        match self.request(|id| WireRequest::Poll { id })? {
            WireResponse::State { state, .. } => Ok(state),
            WireResponse::Error { message, .. } => Err(LinkError::Remote(message)),
            other => Err(LinkError::Protocol(format!(
                "unexpected reply to poll: {:?}",
                other
            ))),
        }
    }
}

type SharedLink = Arc<Mutex<Box<dyn ActuatorLink>>>;

/// 当前占用夹爪的客户端
#[derive(Clone, Default)]
struct ClientSlot {
    holder: Arc<Mutex<Option<SocketAddr>>>,
}

impl ClientSlot {
    /// 占用成功返回租约；已被占用时返回占用者地址
    fn claim(&self, peer: SocketAddr) -> Result<ClientLease, SocketAddr> {
        let mut holder = self.holder.lock();
        match *holder {
            Some(current) => Err(current),
            None => {
                *holder = Some(peer);
                Ok(ClientLease {
                    slot: self.clone(),
                })
            },
        }
    }
}

/// 连接线程退出（包括 panic）时释放占用
struct ClientLease {
    slot: ClientSlot,
}

impl Drop for ClientLease {
    fn drop(&mut self) {
        *self.slot.holder.lock() = None;
    }
}

/// 链路服务端
///
/// 链路同一时刻只交给一个客户端；占用期间的新连接收到 `busy` 问候后被关闭。
///
/// # 示例
///
/// ```rust,no_run
/// use gripper_link::{LinkServer, SimConfig, SimulatedGripper};
///
/// let server = LinkServer::bind("127.0.0.1:18890", SimulatedGripper::new(SimConfig::default()))?;
/// let handle = server.spawn();
/// println!("serving on {}", handle.local_addr());
/// # Ok::<(), gripper_link::LinkError>(())
/// ```
pub struct LinkServer {
    listener: TcpListener,
    link: SharedLink,
    client: ClientSlot,
    running: Arc<AtomicBool>,
}

impl LinkServer {
    /// 绑定监听地址
    pub fn bind(addr: &str, link: impl ActuatorLink + 'static) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            link: Arc::new(Mutex::new(Box::new(link))),
            client: ClientSlot::default(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.listener.local_addr()?)
    }

    /// 退出标志（置为 false 后 `run()` 返回）
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// 阻塞运行，直到退出标志被清除
    pub fn run(self) -> Result<(), LinkError> {
        let addr = self.local_addr()?;
        info!("Link server listening on {}", addr);

        while self.running.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => self.accept(stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(SERVER_TICK);
                },
                Err(e) => {
                    error!("Accept failed: {}", e);
                    return Err(e.into());
                },
            }
        }

        info!("Link server on {} stopped", addr);
        Ok(())
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        let lease = match self.client.claim(peer) {
            Ok(lease) => lease,
            Err(holder) => {
                warn!("Refusing client {}: gripper in use by {}", peer, holder);
                if let Err(e) = refuse_connection(stream, holder) {
                    debug!("Failed to notify refused client {}: {}", peer, e);
                }
                return;
            },
        };

        info!("Client connected: {}", peer);
        let link = self.link.clone();
        let running = self.running.clone();
        spawn(move || {
            let _lease = lease;
            if let Err(e) = serve_connection(stream, link, running) {
                warn!("Client {} closed with error: {}", peer, e);
            } else {
                debug!("Client {} disconnected", peer);
            }
        });
    }

    /// 在后台线程运行
    pub fn spawn(self) -> LinkServerHandle {
        let running = self.running.clone();
        let local_addr = self
            .listener
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        let thread = spawn(move || {
            if let Err(e) = self.run() {
                error!("Link server terminated: {}", e);
            }
        });
        LinkServerHandle {
            running,
            local_addr,
            thread: Some(thread),
        }
    }
}

/// 后台服务端句柄（Drop 时停止并等待线程退出）
pub struct LinkServerHandle {
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<()>>,
}

impl LinkServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Link server thread panicked");
        }
    }
}

impl Drop for LinkServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn write_message(writer: &mut TcpStream, message: &WireResponse) -> Result<(), LinkError> {
    let mut line =
        serde_json::to_string(message).map_err(|e| LinkError::Protocol(e.to_string()))?;
    line.push('\n');
    writer.write_all(line.as_bytes())?;
    Ok(())
}

fn refuse_connection(mut stream: TcpStream, holder: SocketAddr) -> Result<(), LinkError> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(SERVER_TICK))?;
    write_message(
        &mut stream,
        &WireResponse::Busy {
            holder: holder.to_string(),
        },
    )
}

fn serve_connection(
    stream: TcpStream,
    link: SharedLink,
    running: Arc<AtomicBool>,
) -> Result<(), LinkError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(SERVER_TICK))?;
    stream.set_nodelay(true)?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    write_message(&mut writer, &WireResponse::Ready)?;

    while running.load(Ordering::Acquire) {
        // 读超时时已读到的部分数据保留在 line 中，下一轮继续拼接
        match reader.read_line(&mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {},
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => return Err(e.into()),
        }
        if !line.ends_with('\n') {
            continue;
        }

        let response = match serde_json::from_str::<WireRequest>(line.trim_end()) {
            Ok(request) => handle_request(&link, request),
            Err(e) => WireResponse::Error {
                id: UNKNOWN_REQUEST_ID,
                message: format!("malformed request: {}", e),
            },
        };
        line.clear();
        write_message(&mut writer, &response)?;
    }
    Ok(())
}

fn handle_request(link: &SharedLink, request: WireRequest) -> WireResponse {
    let mut link = link.lock();
    match request {
        WireRequest::Command { id, target } => match link.send(target) {
            Ok(()) => WireResponse::Ack { id },
            Err(e) => WireResponse::Error {
                id,
                message: e.to_string(),
            },
        },
        WireRequest::Poll { id } => match link.poll() {
            Ok(state) => WireResponse::State { id, state },
            Err(e) => WireResponse::Error {
                id,
                message: e.to_string(),
            },
        },
    }
}
