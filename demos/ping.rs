use std::{net::IpAddr, time::Duration};

use icmp_dispatch::{Config, IpStatus, PingOptions, Pinger};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let localhost_v4: IpAddr = "127.0.0.1".parse().unwrap();
    let localhost_v6: IpAddr = "::1".parse().unwrap();
    let not_answering_v4: IpAddr = "192.0.2.1".parse().unwrap();

    let config = Config::builder().timeout(Duration::from_secs(1)).build();
    let mut pinger = Pinger::with_config(config);

    for addr in [localhost_v4, localhost_v6, not_answering_v4] {
        match pinger.ping(addr) {
            Ok(reply) if reply.status() == IpStatus::Success => println!(
                "{}: {} bytes in {:?}, ttl={:?}",
                reply.address(),
                reply.payload().len(),
                reply.round_trip_time(),
                reply.options().map(|options| options.ttl)
            ),
            Ok(reply) => println!("{}: {}", addr, reply.status()),
            Err(err) => println!("{}: {}", addr, err),
        }
    }

    let options = PingOptions::new(64, true);
    let pending = pinger
        .send_async(localhost_v4, &[0; 56], Duration::from_secs(1), Some(&options))
        .expect("submit echo request");
    match pending.await {
        Ok(reply) => println!("{} (async): {:?}", reply.address(), reply.round_trip_time()),
        Err(err) => println!("{} (async): {}", localhost_v4, err),
    }
}
