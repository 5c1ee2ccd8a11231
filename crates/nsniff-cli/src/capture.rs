//! Capture command - runs one session until interrupted

use anyhow::{Context, Result};
use nsniff_core::{AddressFilter, Config, Error as CoreError};
use nsniff_platform::{CaptureSession, PlatformError, SessionOptions, StateError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::args::Args;
use crate::output::Printer;

/// How often the main thread checks the running flag
const WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// Everything a capture run needs, resolved from file and flags
#[derive(Debug)]
pub struct Plan {
    pub interface: String,
    pub options: SessionOptions,
    pub filters: Vec<AddressFilter>,
}

/// Merge the configuration file with command-line overrides
pub fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(ref iface) = args.interface {
        config.capture.interface = Some(iface.clone());
    }
    if args.promisc {
        config.capture.promiscuous = true;
    }
    if args.include_eth {
        config.capture.include_link_header = true;
    }

    config.validate()?;
    Ok(config)
}

/// Resolve interface, options and the full filter list
///
/// Filters from the file come first, then the positional addresses with the
/// `-p`/`-d` gates applied.
pub fn plan(args: &Args, config: &Config) -> Result<Plan> {
    let interface = config
        .capture
        .interface
        .clone()
        .ok_or_else(|| CoreError::config_value("capture.interface", "no interface specified (use -i)"))?;

    let mut filters = config.address_filters()?;
    for address in &args.addresses {
        let filter = AddressFilter::parse(address)?
            .with_direction(args.direction)
            .with_protocol(args.protocol);
        filters.push(filter);
    }

    if filters.is_empty() {
        return Err(CoreError::Config("no address specified".to_string()).into());
    }
    if filters.len() > config.capture.max_filters {
        return Err(CoreError::CapacityExceeded {
            max: config.capture.max_filters,
        }
        .into());
    }

    Ok(Plan {
        interface,
        options: SessionOptions::from(&config.capture),
        filters,
    })
}

/// Pump the session until the flag drops or the session stops
fn pump(session: &CaptureSession, running: &AtomicBool) -> nsniff_platform::Result<()> {
    while running.load(Ordering::SeqCst) {
        match session.process_next_packet() {
            Ok(_) => {}
            Err(PlatformError::State(StateError::NotRunning)) if !running.load(Ordering::SeqCst) => {
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Execute the capture
pub fn execute(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let plan = plan(args, &config)?;
    debug!(?plan, "Resolved capture plan");

    let printer = Printer {
        json: args.json,
        link_header: plan.options.include_link_header,
        payload: !args.no_payload,
    };

    let session = Arc::new(
        CaptureSession::create(&plan.interface, plan.options.clone())
            .context("Failed to open capture socket")?,
    );
    for filter in &plan.filters {
        session.add_filter(*filter)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let printed = Arc::new(AtomicU64::new(0));
    {
        let running = running.clone();
        let printed = printed.clone();
        let limit = args.max_packets;
        session.set_handler(move |frame| {
            printer.print(frame);
            let count = printed.fetch_add(1, Ordering::SeqCst) + 1;
            if limit.is_some_and(|max| count >= max) {
                running.store(false, Ordering::SeqCst);
            }
        })?;
    }

    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    session
        .start()
        .with_context(|| format!("Failed to start capture on {}", plan.interface))?;
    info!(
        interface = %plan.interface,
        local_ip = ?session.local_ip(),
        filters = session.filter_count(),
        "Listening"
    );

    let worker = {
        let session = session.clone();
        let running = running.clone();
        thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || pump(&session, &running))
            .context("Failed to spawn capture thread")?
    };

    while running.load(Ordering::SeqCst) && !worker.is_finished() {
        thread::sleep(WAIT_INTERVAL);
    }
    running.store(false, Ordering::SeqCst);

    let stop_result = if session.is_running() {
        session.stop()
    } else {
        Ok(())
    };

    let pump_result = match worker.join() {
        Ok(result) => result,
        Err(_) => {
            session.clear();
            anyhow::bail!("Capture thread panicked");
        }
    };

    let stats = session.stats();
    info!(
        received = stats.received,
        delivered = stats.delivered,
        filtered = stats.filtered,
        duplicates = stats.duplicates,
        undecodable = stats.undecodable,
        "Capture finished"
    );
    session.clear();

    pump_result.context("Capture failed")?;
    if let Err(e) = stop_result {
        warn!(error = %e, "Stop reported an error");
        return Err(e).context("Failed to stop capture");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use nsniff_core::{Direction, Protocol};

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["netsniffer"];
        full.extend_from_slice(argv);
        Args::parse_from(full)
    }

    #[test]
    fn test_plan_from_flags() {
        let args = args(&["-i", "lo", "-p", "udp", "-d", "dst", "--promisc", "any:53"]);
        let config = load_config(&args).unwrap();
        let plan = plan(&args, &config).unwrap();

        assert_eq!(plan.interface, "lo");
        assert!(plan.options.promiscuous);
        assert_eq!(plan.filters.len(), 1);
        assert_eq!(plan.filters[0].port, 53);
        assert_eq!(plan.filters[0].protocol, Protocol::Udp);
        assert_eq!(plan.filters[0].direction, Direction::Destination);
    }

    #[test]
    fn test_plan_requires_interface() {
        let args = args(&["any:53"]);
        let config = load_config(&args).unwrap();
        let err = plan(&args, &config).unwrap_err();
        let core = err.downcast_ref::<CoreError>().unwrap();
        assert!(matches!(core, CoreError::ConfigValue { .. }));
    }

    #[test]
    fn test_plan_requires_address() {
        let args = args(&["-i", "lo"]);
        let config = load_config(&args).unwrap();
        let err = plan(&args, &config).unwrap_err();
        assert!(err.to_string().contains("no address specified"));
    }

    #[test]
    fn test_plan_rejects_bad_address() {
        let args = args(&["-i", "lo", "localhost"]);
        let config = load_config(&args).unwrap();
        let err = plan(&args, &config).unwrap_err();
        assert!(err
            .downcast_ref::<CoreError>()
            .is_some_and(CoreError::is_configuration));
    }

    #[test]
    fn test_plan_merges_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netsniffer.toml");
        std::fs::write(
            &path,
            "[capture]\ninterface = \"eth0\"\n\n[[filters]]\naddress = \"10.0.0.1:80\"\nprotocol = \"tcp\"\n",
        )
        .unwrap();

        let args = args(&["-c", path.to_str().unwrap(), "-i", "lo", "any:53"]);
        let config = load_config(&args).unwrap();
        let plan = plan(&args, &config).unwrap();

        assert_eq!(plan.interface, "lo");
        assert_eq!(plan.filters.len(), 2);
        assert_eq!(plan.filters[0].port, 80);
        assert_eq!(plan.filters[0].protocol, Protocol::Tcp);
        assert_eq!(plan.filters[1].port, 53);
    }
}
