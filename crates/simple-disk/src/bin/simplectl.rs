//! Operator frontend for the volume engine: inspect candidate disks, check
//! selection rules, recruit blank disks and dry-run query matching.

use std::{collections::BTreeMap, path::PathBuf, process::ExitCode};

use anyhow::{Context, Error};
use clap::{Parser, Subcommand};
use log::{error, LevelFilter};

use simple_disk::{
    device::{filter, topology, DeviceDatabase, SelectionRule, UdevDatabase},
    query::VolumeQuery,
    tools::SystemTools,
    volume::{self, candidates::label_and_data_devices, DiskState},
};

/// Exit codes of `simplectl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimplectlExitCode {
    /// The command did what was asked.
    Success = 0,

    /// The command ran but the answer is negative (no match, disk not
    /// usable).
    Negative = 1,

    /// The command failed.
    Failed = 2,
}

impl From<SimplectlExitCode> for ExitCode {
    fn from(code: SimplectlExitCode) -> Self {
        Self::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[clap(about = "Inspect and recruit disks for simple volumes")]
struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Info)]
    verbosity: LevelFilter,

    /// Subsystem globs a device must match to be considered
    #[arg(global = true, long = "match-subsystem", default_values_t = [String::from("block")])]
    match_subsystems: Vec<String>,

    /// Sysname globs a device must match to be considered
    #[arg(global = true, long = "match-name", default_values_t = [String::from("sd*")])]
    match_names: Vec<String>,

    /// Tag globs a device must carry to be considered
    #[arg(global = true, long = "match-tag")]
    match_tags: Vec<String>,

    /// KEY=VALUE property globs a device must match to be considered
    #[arg(global = true, long = "match-property", value_parser = parse_key_value, default_values_t = [KeyValue("DEVTYPE".to_string(), "disk".to_string())])]
    match_properties: Vec<KeyValue>,

    /// KEY=VALUE sysfs attribute globs a device must match to be considered
    #[arg(global = true, long = "match-attr", value_parser = parse_key_value)]
    match_attrs: Vec<KeyValue>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyValue(String, String);

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.0, self.1)
    }
}

fn parse_key_value(raw: &str) -> Result<KeyValue, String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => {
            Ok(KeyValue(key.to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the devices selected by the match rules
    List,

    /// Bucket the selected disks into initialized, blank and rejected
    Candidates,

    /// Classify a single disk
    Classify {
        /// Device node of the disk, e.g. /dev/sdb
        disk: PathBuf,
    },

    /// Print the selection rule that would uniquely match a device
    Rule {
        /// Device node to describe
        device: PathBuf,
    },

    /// Partition and label a blank disk according to a volume query
    Init {
        /// Device node of the disk to recruit
        disk: PathBuf,

        /// The volume query, e.g. label.logs_filesystem.ext4
        query: VolumeQuery,

        /// Hostname to record in the label; defaults to this host's
        #[arg(long)]
        hostname: Option<String>,

        /// Machine id to record in the label; defaults to this machine's
        #[arg(long)]
        machine_id: Option<String>,
    },

    /// Check whether an initialized disk satisfies a volume query
    Match {
        /// Device node of the disk to check
        disk: PathBuf,

        /// The volume query to check against
        query: VolumeQuery,
    },

    /// Parse a volume query and print it back in canonical form
    ParseQuery {
        /// The query string to parse
        query: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::builder()
        .filter_level(cli.verbosity)
        .format_timestamp(None)
        .init();

    match run(&cli) {
        Ok(code) => code.into(),
        Err(err) => {
            error!("{err:#}");
            SimplectlExitCode::Failed.into()
        }
    }
}

fn run(cli: &Cli) -> Result<SimplectlExitCode, Error> {
    let rules = vec![cli.selection_rule()];
    let db = UdevDatabase;
    let tools = SystemTools;

    match &cli.command {
        Commands::List => {
            let snapshot = db.snapshot()?;
            for devnode in filter::device_nodes(&snapshot, &rules)? {
                println!("{}", devnode.display());
            }
            Ok(SimplectlExitCode::Success)
        }

        Commands::Candidates => {
            let buckets = volume::candidates(&db, &rules)?;
            for devnode in &buckets.initialized {
                println!("initialized\t{}", devnode.display());
            }
            for devnode in &buckets.blank {
                println!("blank\t{}", devnode.display());
            }
            for (devnode, reason) in &buckets.rejected {
                println!("rejected\t{}\t{reason}", devnode.display());
            }
            Ok(SimplectlExitCode::Success)
        }

        Commands::Classify { disk } => {
            let snapshot = db.snapshot()?;
            match volume::classify(&snapshot, disk)? {
                DiskState::Initialized => {
                    println!("initialized");
                    Ok(SimplectlExitCode::Success)
                }
                DiskState::Blank => {
                    println!("blank");
                    Ok(SimplectlExitCode::Success)
                }
                DiskState::Rejected(reason) => {
                    println!("rejected: {reason}");
                    Ok(SimplectlExitCode::Negative)
                }
            }
        }

        Commands::Rule { device } => {
            let snapshot = db.snapshot()?;
            let record = topology::lookup_device(&snapshot, device)?;
            print_rule(&record.to_selection_rule());
            Ok(SimplectlExitCode::Success)
        }

        Commands::Init {
            disk,
            query,
            hostname,
            machine_id,
        } => {
            let hostname = match hostname {
                Some(hostname) => hostname.clone(),
                None => diskutils::identity::hostname().context("Failed to resolve hostname")?,
            };
            // A host without a machine id can still label disks; the field
            // stays empty and machine-id queries will not match them.
            let machine_id = match machine_id {
                Some(machine_id) => machine_id.clone(),
                None => diskutils::identity::machine_id().unwrap_or_default(),
            };
            volume::initialize(&db, &tools, disk, query, &hostname, &machine_id)?;
            Ok(SimplectlExitCode::Success)
        }

        Commands::Match { disk, query } => {
            let snapshot = db.snapshot()?;
            let (label_device, data_device) = label_and_data_devices(&snapshot, disk)?;
            if volume::query_matches(&db, &tools, query, &label_device, &data_device)? {
                println!("match");
                Ok(SimplectlExitCode::Success)
            } else {
                println!("no match");
                Ok(SimplectlExitCode::Negative)
            }
        }

        Commands::ParseQuery { query } => {
            let parsed = VolumeQuery::parse(query)?;
            println!("{parsed:#?}");
            println!("{}", parsed.to_label_string()?);
            Ok(SimplectlExitCode::Success)
        }
    }
}

impl Cli {
    fn selection_rule(&self) -> SelectionRule {
        SelectionRule {
            subsystems: self.match_subsystems.clone(),
            names: self.match_names.clone(),
            tags: self.match_tags.clone(),
            properties: to_map(&self.match_properties),
            attrs: to_map(&self.match_attrs),
        }
    }
}

fn to_map(pairs: &[KeyValue]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|KeyValue(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn print_rule(rule: &SelectionRule) {
    for subsystem in &rule.subsystems {
        println!("--match-subsystem {subsystem}");
    }
    for name in &rule.names {
        println!("--match-name {name}");
    }
    for tag in &rule.tags {
        println!("--match-tag {tag}");
    }
    for (key, value) in &rule.properties {
        println!("--match-property {key}={value}");
    }
    for (key, value) in &rule.attrs {
        println!("--match-attr {key}={value}");
    }
}
