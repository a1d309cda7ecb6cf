use argh::FromArgs;
use vader::config::{Config, TOKEN_ENV_VAR};
use vader::runner;

#[derive(FromArgs)]
/// Publish current Weather Underground conditions as hemtjanst sensors
struct Args {
    /// path to a YAML configuration file (optional)
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// location to fetch the current conditions of (default: autoip)
    #[argh(option)]
    location: Option<String>,

    /// hours after which to query the Wunderground API for new data (default: 1)
    #[argh(option)]
    refresh: Option<u64>,

    /// wunderground API token (required)
    #[argh(option)]
    token: Option<String>,

    /// MQTT broker address, host:port (default: localhost:1883)
    #[argh(option)]
    mqtt_address: Option<String>,

    /// MQTT username
    #[argh(option)]
    mqtt_username: Option<String>,

    /// MQTT password
    #[argh(option)]
    mqtt_password: Option<String>,

    /// MQTT client id, also used as last will id (default: vader)
    #[argh(option)]
    mqtt_client_id: Option<String>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(location) = self.location {
            config.weather.location = location;
        }
        if let Some(refresh) = self.refresh {
            config.refresh_hours = refresh;
        }
        if let Some(token) = self.token {
            config.weather.token = token;
        }
        if let Some(address) = self.mqtt_address {
            config.mqtt.address = address;
        }
        if let Some(username) = self.mqtt_username {
            config.mqtt.username = Some(username);
        }
        if let Some(password) = self.mqtt_password {
            config.mqtt.password = Some(password);
        }
        if let Some(client_id) = self.mqtt_client_id {
            config.mqtt.client_id = client_id;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    runner::setup_logging();

    let args: Args = argh::from_env();
    log::info!("Starting vader v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                log::error!("Failed to load config from '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    args.apply(&mut config);
    config.apply_env_token(std::env::var(TOKEN_ENV_VAR).ok());

    if let Err(e) = config.validate() {
        log::error!("{}", e);
        std::process::exit(1);
    }

    let shutdown = runner::shutdown_signal()?;

    if let Err(e) = runner::run(config, shutdown).await {
        log::error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}
