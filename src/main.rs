// SpaceTraders Fleet Commander - entry point
use clap::Parser;
use spacetraders_fc::fleet::registry::MissionKind;
use spacetraders_fc::{FleetCommander, FleetConfig, Settings, o_summary, verbosity};
use std::collections::HashMap;

#[derive(Parser)]
#[command(name = "spacetraders_fc")]
#[command(about = "SpaceTraders autonomous fleet commander - all ships in one process")]
struct Args {
    /// Override mission assignment, e.g. --assign AGENT-3:trade (repeatable)
    #[arg(long, value_name = "SHIP:MISSION")]
    assign: Vec<String>,

    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count,
          help = "Increase verbosity (-v info, -vv debug)")]
    verbose: u8,
}

/// Parse --assign SHIP:mission pairs into an override map.
fn parse_overrides(raw: &[String]) -> Result<HashMap<String, String>, String> {
    let mut overrides = HashMap::new();
    for item in raw {
        let Some((ship, mission)) = item.split_once(':') else {
            return Err(format!("Invalid --assign format: '{}' (expected SHIP:mission)", item));
        };
        let mission = mission.to_lowercase();
        if MissionKind::parse(&mission).is_none() {
            return Err(format!(
                "Unknown mission '{}' for {} (expected trade/scan/contract/gate_build/idle)",
                mission, ship
            ));
        }
        overrides.insert(ship.to_uppercase(), mission);
    }
    Ok(overrides)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    verbosity::set_verbosity_level(args.verbose);

    let overrides = match parse_overrides(&args.assign) {
        Ok(overrides) => overrides,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(2);
        }
    };

    let settings = Settings::from_env();
    if settings.token.is_empty() {
        eprintln!("SPACETRADERS_TOKEN is not set");
        std::process::exit(2);
    }
    let config = FleetConfig::load(&settings.data_dir.join("fleet.toml"));

    o_summary!("🚀 SpaceTraders Fleet Commander starting...");
    if !overrides.is_empty() {
        o_summary!("🎛️  Manual overrides: {:?}", overrides);
    }

    let commander = FleetCommander::new(settings, config, overrides);
    commander.run().await
}
