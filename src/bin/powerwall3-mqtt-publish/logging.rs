use std::io::Write;

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;

pub fn init_logger(level: LevelFilter) {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        // keep the HTTP and MQTT stacks quiet unless asked for explicitly
        .filter(Some("rumqttc"), level.min(LevelFilter::Info))
        .filter(Some("reqwest"), level.min(LevelFilter::Info))
        .init();
}
