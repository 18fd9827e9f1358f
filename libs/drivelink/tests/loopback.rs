//! Full exchanges against a scripted drive on a real TCP socket.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use drivelink::{ModbusClient, TcpTransport};

/// Answers read requests with words 100, 101, ... and echoes writes.
async fn serve_one_drive(listener: TcpListener) {
    let (mut socket, _) = match listener.accept().await {
        Ok(pair) => pair,
        Err(_) => return,
    };

    loop {
        let mut header = [0u8; 7];
        if socket.read_exact(&mut header).await.is_err() {
            return;
        }
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut body = vec![0u8; length - 1];
        if socket.read_exact(&mut body).await.is_err() {
            return;
        }

        let function = body[0];
        let response_pdu: Vec<u8> = match function {
            0x03 | 0x04 => {
                let quantity = u16::from_be_bytes([body[3], body[4]]);
                let mut pdu = vec![function, (quantity * 2) as u8];
                for i in 0..quantity {
                    pdu.extend_from_slice(&(100 + i).to_be_bytes());
                }
                pdu
            }
            0x06 => body.clone(),
            _ => vec![function | 0x80, 0x01],
        };

        let mut frame = Vec::with_capacity(7 + response_pdu.len());
        frame.extend_from_slice(&header[..2]);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&((response_pdu.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&response_pdu);
        if socket.write_all(&frame).await.is_err() {
            return;
        }
    }
}

#[tokio::test]
async fn tcp_read_and_write_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_one_drive(listener));

    let transport = TcpTransport::new(addr.ip().to_string(), addr.port(), Duration::from_secs(2));
    let mut client = ModbusClient::new(Box::new(transport), 1, Duration::from_secs(1));
    client.connect().await.unwrap();

    let words = client.read_holding_registers(0, 3).await.unwrap();
    assert_eq!(words, vec![100, 101, 102]);

    let words = client.read_input_registers(20, 1).await.unwrap();
    assert_eq!(words, vec![100]);

    client.write_single_register(5, 4500).await.unwrap();

    client.disconnect().await.unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = TcpTransport::new(addr.ip().to_string(), addr.port(), Duration::from_secs(2));
    let mut client = ModbusClient::new(Box::new(transport), 1, Duration::from_secs(1));
    assert!(client.connect().await.is_err());
}
