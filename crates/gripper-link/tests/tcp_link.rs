//! TCP 链路集成测试
//!
//! 在本地回环地址启动以仿真夹爪为后端的 `LinkServer`，通过 `TcpLink` 访问。

use gripper_link::{ActuatorLink, LinkError, LinkServer, SimConfig, SimulatedGripper, TcpLink};
use gripper_protocol::{GripperState, LinkTarget, WireRequest, WireResponse};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

const IO_TIMEOUT: Duration = Duration::from_millis(500);

fn start_server(config: SimConfig) -> (gripper_link::LinkServerHandle, gripper_link::SimControl) {
    let sim = SimulatedGripper::new(config);
    let control = sim.control();
    let server = LinkServer::bind("127.0.0.1:0", sim).expect("bind");
    (server.spawn(), control)
}

#[test]
fn test_move_over_tcp() {
    let (server, _control) = start_server(SimConfig::default());
    let mut link = TcpLink::connect(&server.local_addr().to_string(), IO_TIMEOUT).unwrap();

    let first = link.poll().unwrap();
    assert_eq!(first.width, 0.08);

    link.send(LinkTarget::Move {
        width: 0.07,
        speed: 0.2,
    })
    .unwrap();

    // 0.01 m / 0.2 m/s = 50ms，留足余量
    let deadline = Instant::now() + Duration::from_secs(2);
    let state = loop {
        let state = link.poll().unwrap();
        if !state.is_moving || Instant::now() > deadline {
            break state;
        }
        std::thread::sleep(Duration::from_millis(5));
    };
    assert!(!state.is_moving);
    assert!((state.width - 0.07).abs() < 1e-9);
    assert!(state.sequence > first.sequence);
}

#[test]
fn test_remote_error_is_reported() {
    let (server, control) = start_server(SimConfig::default());
    let mut link = TcpLink::connect(&server.local_addr().to_string(), IO_TIMEOUT).unwrap();

    control.set_unreachable(true);
    assert!(matches!(link.poll(), Err(LinkError::Remote(_))));
    assert!(matches!(link.send(LinkTarget::Stop), Err(LinkError::Remote(_))));

    control.set_unreachable(false);
    assert!(link.poll().is_ok());
}

#[test]
fn test_malformed_request_gets_error_reply() {
    let (server, _control) = start_server(SimConfig::default());
    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut greeting = String::new();
    reader.read_line(&mut greeting).unwrap();
    assert_eq!(greeting.trim_end(), r#"{"reply":"ready"}"#);

    stream.write_all(b"not json\n").unwrap();
    let mut reply = String::new();
    reader.read_line(&mut reply).unwrap();
    assert!(reply.contains("\"reply\":\"error\""), "reply: {}", reply);
}

#[test]
fn test_connect_refused_is_unreachable() {
    // 绑定后立即释放，得到一个大概率无人监听的端口
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let result = TcpLink::connect(&addr.to_string(), IO_TIMEOUT);
    assert!(matches!(result, Err(LinkError::Unreachable(_))));
}

#[test]
fn test_server_shutdown_disconnects_client() {
    let (server, _control) = start_server(SimConfig::default());
    let mut link = TcpLink::connect(&server.local_addr().to_string(), IO_TIMEOUT).unwrap();
    assert!(link.poll().is_ok());

    server.shutdown();
    std::thread::sleep(Duration::from_millis(100));
    assert!(link.poll().is_err());
}

#[test]
fn test_second_client_is_refused_while_first_connected() {
    let (server, _control) = start_server(SimConfig::default());
    let addr = server.local_addr().to_string();

    let mut first = TcpLink::connect(&addr, IO_TIMEOUT).unwrap();
    let second = TcpLink::connect(&addr, IO_TIMEOUT);
    assert!(matches!(second, Err(LinkError::InUse(_))));
    assert!(first.poll().is_ok());

    // 第一个客户端断开后夹爪重新可用（释放由服务端连接线程异步完成）
    drop(first);
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut third = loop {
        match TcpLink::connect(&addr, IO_TIMEOUT) {
            Ok(link) => break link,
            Err(LinkError::InUse(_)) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10));
            },
            Err(e) => panic!("reconnect failed: {}", e),
        }
    };
    assert!(third.poll().is_ok());
}

fn write_line(writer: &mut TcpStream, message: &WireResponse) -> std::io::Result<()> {
    writeln!(writer, "{}", serde_json::to_string(message).unwrap())
}

fn reply_to(request: WireRequest) -> WireResponse {
    match request {
        WireRequest::Command { id, .. } => WireResponse::Ack { id },
        WireRequest::Poll { id } => WireResponse::State {
            id,
            state: GripperState::default(),
        },
    }
}

/// 只有第一个回复延迟 `delay` 的服务端
fn slow_first_reply_server(delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        write_line(&mut writer, &WireResponse::Ready).unwrap();

        for (n, line) in BufReader::new(stream).lines().enumerate() {
            let Ok(line) = line else { break };
            let request: WireRequest = serde_json::from_str(&line).unwrap();
            if n == 0 {
                std::thread::sleep(delay);
            }
            if write_line(&mut writer, &reply_to(request)).is_err() {
                break;
            }
        }
    });
    addr
}

#[test]
fn test_late_reply_is_discarded_after_timeout() {
    let addr = slow_first_reply_server(Duration::from_millis(300));
    let mut link = TcpLink::connect(&addr.to_string(), Duration::from_millis(100)).unwrap();

    assert_eq!(link.send(LinkTarget::Stop), Err(LinkError::Timeout));
    assert!(link.is_connected());

    // 等迟到的回复到达，它必须被丢弃而不是被当作下一个请求的回复
    std::thread::sleep(Duration::from_millis(300));
    for _ in 0..5 {
        assert!(link.poll().is_ok());
        assert_eq!(link.send(LinkTarget::Stop), Ok(()));
    }
}

/// 第一个连接读到一个请求后直接断开，之后的连接正常服务
fn drop_first_connection_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for (n, stream) in listener.incoming().enumerate() {
            let Ok(stream) = stream else { break };
            let mut writer = stream.try_clone().unwrap();
            write_line(&mut writer, &WireResponse::Ready).unwrap();

            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            while reader.read_line(&mut line).is_ok_and(|read| read > 0) {
                if n == 0 {
                    break;
                }
                let request: WireRequest = serde_json::from_str(line.trim_end()).unwrap();
                line.clear();
                if write_line(&mut writer, &reply_to(request)).is_err() {
                    break;
                }
            }
        }
    });
    addr
}

#[test]
fn test_reconnects_after_disconnect() {
    let addr = drop_first_connection_server();
    let mut link = TcpLink::connect(&addr.to_string(), IO_TIMEOUT).unwrap();

    assert_eq!(link.poll(), Err(LinkError::Disconnected));
    assert!(!link.is_connected());

    assert!(link.poll().is_ok());
    assert!(link.is_connected());
    assert_eq!(link.send(LinkTarget::Stop), Ok(()));
}
