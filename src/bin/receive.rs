use hfarq::frame;
use hfarq::station::{self, Event};

static EVENT_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1000);

// Keep answering for a while after completion, in case the final acknowledgment is lost
static LINGER_TIME: std::time::Duration = std::time::Duration::from_millis(5000);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = std::env::args().collect::<Vec<_>>();

    if args.len() < 4 {
        eprintln!("usage: hfarq-receive <bind addr> <peer addr> <file>");
        std::process::exit(2);
    }

    let config = station::Config {
        endpoint: hfarq::endpoint::Config {
            local_address: frame::Address::new("RX"),
            remote_address: frame::Address::new("TX"),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut station = hfarq::Station::bind_with_config(&args[1], &args[2], config)
        .expect("failed to create hfarq station");

    station.receive().expect("failed to begin receiving");

    loop {
        while let Some(event) = station.wait_event_timeout(EVENT_TIMEOUT) {
            match event {
                Event::StateChange(old, new) => {
                    tracing::info!(?old, ?new, "state change");
                }
                Event::Receive(data) => {
                    std::fs::write(&args[3], &data).expect("failed to write output file");
                    println!("received {} bytes: {}", data.len(), station.stats());

                    while station.wait_event_timeout(LINGER_TIME).is_some() {}

                    return;
                }
                Event::Sent => (),
                Event::Error(error) => {
                    eprintln!("transfer failed: {}", error);
                    std::process::exit(1);
                }
            }
        }
    }
}
