use hfarq::station::{self, Event};
use hfarq::{frame, DataRate};

static EVENT_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1000);

fn usage() -> ! {
    eprintln!("usage: hfarq-send <bind addr> <peer addr> <file> [bps]");
    std::process::exit(2);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = std::env::args().collect::<Vec<_>>();

    if args.len() < 4 {
        usage();
    }

    let data_rate = match args.get(4).map(|bps| bps.parse::<u32>()) {
        None => DataRate::default(),
        Some(Ok(bps)) => hfarq::rate::ALL_RATES
            .iter()
            .copied()
            .find(|rate| rate.bits_per_second() == bps)
            .unwrap_or_else(|| usage()),
        Some(Err(_)) => usage(),
    };

    let payload = std::fs::read(&args[3]).expect("failed to read input file");

    let config = station::Config {
        endpoint: hfarq::endpoint::Config {
            data_rate,
            local_address: frame::Address::new("TX"),
            remote_address: frame::Address::new("RX"),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut station = hfarq::Station::bind_with_config(&args[1], &args[2], config)
        .expect("failed to create hfarq station");

    station.send(&payload).expect("failed to start transmission");

    loop {
        while let Some(event) = station.wait_event_timeout(EVENT_TIMEOUT) {
            match event {
                Event::StateChange(old, new) => {
                    tracing::info!(?old, ?new, "state change");
                }
                Event::Sent => {
                    println!("sent {} bytes: {}", payload.len(), station.stats());
                    return;
                }
                Event::Receive(_) => (),
                Event::Error(error) => {
                    eprintln!("transfer failed: {}", error);
                    std::process::exit(1);
                }
            }
        }
    }
}
