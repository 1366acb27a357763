//! CLI entrypoint: `rusty_raft <port> <id> [<peer_id>@<host:port> ...]`.
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};

use rusty_raft::server::{self, Config};

fn parse_args(args: &[String]) -> std::result::Result<Config, String> {
    if args.len() < 3 {
        return Err(format!(
            "usage: {} <port> <id> [<peer_id>@<host:port> ...]",
            args[0]
        ));
    }
    let port: u16 = args[1]
        .parse()
        .map_err(|_| format!("bad port {:?}", args[1]))?;
    let id = args[2].clone();

    let mut peers = HashMap::new();
    for raw in &args[3..] {
        let (peer_id, addr) = raw
            .split_once('@')
            .ok_or_else(|| format!("bad peer spec {:?}, want id@host:port", raw))?;
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| format!("bad peer address in {:?}", raw))?;
        peers.insert(peer_id.to_string(), addr);
    }

    let me_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    Ok(Config::new((id, me_addr), peers))
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = server::run(config) {
        log::error!("replica exited with error: {}", e);
        std::process::exit(1);
    }
}
