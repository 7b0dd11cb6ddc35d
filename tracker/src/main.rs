use anyhow::{anyhow, bail, Context};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use homecare_tracker::{
    api::{ApiClient, AttendanceApi},
    config::Config,
    geo::{evaluate, Coordinate, GpsdLocationProvider, LocationOptions, LocationTracker},
    state::{
        AppStore, AttendanceMachine, AttendanceSettings, GeofenceBoard, Notification,
        NotificationLevel,
    },
    telemetry::{init_tracing, mask_secret},
    types::ClientId,
};

const USAGE: &str = "usage: homecare-tracker <status | geofences | clock-in [CLIENT_ID] [--at LAT,LON] | clock-out [--at LAT,LON] | watch>";

#[derive(Debug, PartialEq)]
enum Command {
    Status,
    Geofences,
    ClockIn {
        client: Option<ClientId>,
        at: Option<Coordinate>,
    },
    ClockOut {
        at: Option<Coordinate>,
    },
    Watch,
}

fn parse_coordinate(value: &str) -> anyhow::Result<Coordinate> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("expected LAT,LON, got {}", value))?;
    Ok(Coordinate::new(
        lat.trim().parse().context("invalid latitude")?,
        lon.trim().parse().context("invalid longitude")?,
    ))
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        bail!(USAGE);
    };

    let mut client = None;
    let mut at = None;
    let mut rest = rest.iter();
    while let Some(arg) = rest.next() {
        if arg == "--at" {
            let value = rest.next().ok_or_else(|| anyhow!("--at needs LAT,LON"))?;
            at = Some(parse_coordinate(value)?);
        } else if client.is_none() && name == "clock-in" {
            client = Some(
                arg.parse::<ClientId>()
                    .map_err(|_| anyhow!("invalid client id: {}", arg))?,
            );
        } else {
            bail!("unexpected argument {}\n{}", arg, USAGE);
        }
    }

    match name.as_str() {
        "status" => Ok(Command::Status),
        "geofences" => Ok(Command::Geofences),
        "clock-in" => Ok(Command::ClockIn { client, at }),
        "clock-out" => Ok(Command::ClockOut { at }),
        "watch" => Ok(Command::Watch),
        other => bail!("unknown command {}\n{}", other, USAGE),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let config = Config::load()?;
    tracing::info!(
        api_base_url = %config.api_base_url,
        api_token = %config.api_token.as_deref().map(mask_secret).unwrap_or_else(|| "<unset>".into()),
        gpsd_addr = %config.gpsd_addr,
        time_zone = %config.time_zone,
        allow_manual_location = config.allow_manual_location,
        "Loaded configuration from environment/.env"
    );

    let api: Arc<dyn AttendanceApi> = Arc::new(ApiClient::new(&config));
    let store = AppStore::new();
    let mut tracker = LocationTracker::new(
        Arc::new(GpsdLocationProvider::new(config.gpsd_addr.clone())),
        store.clone(),
        LocationOptions::from_config(&config),
    );
    if config.report_locations {
        tracker = tracker.with_reporter(Arc::clone(&api));
    }
    let tracker = Arc::new(tracker);
    let board = Arc::new(GeofenceBoard::new(Arc::clone(&api), store.clone()));
    let machine = AttendanceMachine::new(
        Arc::clone(&api),
        Arc::clone(&tracker),
        Arc::clone(&board),
        store.clone(),
        AttendanceSettings::from_config(&config),
    );

    let mut notifications = store.subscribe_notifications();

    if let Err(err) = machine.reconcile().await {
        tracing::warn!(error = %err, "starting without server state");
    }
    print_notifications(&mut notifications);

    match command {
        Command::Status => {
            let snapshot = machine.snapshot();
            println!("phase: {:?}", snapshot.phase);
            if let Some(session) = snapshot.session {
                println!(
                    "session {} for client {} since {}",
                    session.id, session.client_id, session.clock_in_time
                );
            }
        }
        Command::Geofences => {
            board.refresh().await?;
            if let Err(err) = tracker.get_current_location().await {
                tracing::warn!(error = %err, "showing geofences without a position");
            }
            board.reevaluate(store.location().current.map(|s| s.coordinate));
            for status in store.geofences().statuses {
                let distance = status
                    .distance_m
                    .map(|d| format!("{:.0} m", d))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{} {:<30} {:<24} {:>10} (radius {:.0} m){}",
                    if status.is_inside { "*" } else { " " },
                    status.geofence.name,
                    status.client_name.as_deref().unwrap_or("(unknown client)"),
                    distance,
                    status.geofence.radius_meters,
                    if status.geofence.is_active { "" } else { " inactive" },
                );
            }
        }
        Command::ClockIn { client, at } => {
            let result = match at {
                Some(at) => machine.clock_in_at(client, at).await,
                None => machine.clock_in(client).await,
            };
            if let Ok(session) = result {
                println!("session {}", session.id);
            }
        }
        Command::ClockOut { at } => {
            let result = match at {
                Some(at) => machine.clock_out_at(at).await,
                None => machine.clock_out().await,
            };
            if let Ok(session) = result {
                println!(
                    "session {} completed, {:.2} h",
                    session.id,
                    session.total_hours.unwrap_or_default()
                );
            }
        }
        Command::Watch => {
            if let Err(err) = board.refresh().await {
                tracing::warn!(error = %err, "geofences unavailable");
            }
            let cancel = CancellationToken::new();
            let follower = Arc::clone(&board).follow_location(cancel.clone());
            let mut samples = tracker.start_tracking().await?;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    sample = samples.next() => {
                        let Some(sample) = sample else { break };
                        let records = store.geofences().records;
                        let inside: Vec<String> = evaluate(sample.coordinate, &records)
                            .into_iter()
                            .filter(|s| s.is_inside)
                            .map(|s| s.geofence.name)
                            .collect();
                        println!(
                            "{:.6},{:.6} ±{:.0} m inside: [{}]",
                            sample.coordinate.latitude,
                            sample.coordinate.longitude,
                            sample.accuracy,
                            inside.join(", ")
                        );
                    }
                }
            }
            tracker.stop_tracking();
            cancel.cancel();
            follower.await?;
        }
    }

    print_notifications(&mut notifications);
    Ok(())
}

fn print_notifications(rx: &mut broadcast::Receiver<Notification>) {
    loop {
        match rx.try_recv() {
            Ok(note) => match note.level {
                NotificationLevel::Error => eprintln!("error: {}", note.message),
                _ => println!("{}", note.message),
            },
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notifications dropped");
            }
            Err(_) => break,
        }
    }
}
