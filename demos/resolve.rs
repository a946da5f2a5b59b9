use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
};

use dnsquery::resolver::SyncResolver;
use log::LevelFilter;

fn main() -> io::Result<()> {
    let mut args = std::env::args().skip(1);
    let domain = args.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "usage: resolve <domain> [server address]",
        )
    })?;
    let server = match args.next() {
        Some(arg) => arg
            .parse::<SocketAddr>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?,
        None => SocketAddr::from((Ipv4Addr::new(8, 8, 8, 8), 53)),
    };

    env_logger::Builder::new()
        .filter_module("dnsquery", LevelFilter::Debug)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .parse_default_env()
        .init();

    let mut client = SyncResolver::new(server)?;
    let ips = client.resolve(&domain)?;
    log::debug!("{} answers from {}", ips.len(), client.server());
    for ip in ips {
        println!("{} {}", domain, ip);
    }
    Ok(())
}
