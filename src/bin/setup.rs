//! Interactive setup for historical statistics sensors.
//!
//! Walks through the creation wizard, or edits, removes and lists stored
//! configurations. The running daemon picks up changes on its next reload.

use chrono::Utc;
use clap::Parser;
use historical_stats::database::Database;
use historical_stats::error::WizardError;
use historical_stats::points::{MeasurementPoint, StatType, TimeUnit};
use historical_stats::settings::Settings;
use historical_stats::translations::EN;
use historical_stats::wizard::{
    entry_title, ConfigFlow, DetailsInput, OptionsFlow, PointInput,
};
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Configure historical statistics sensors
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recorder database path
    #[arg(long, env = "HISTORICAL_STATS_DB")]
    db: Option<PathBuf>,

    /// Edit the measurement points of an existing configuration
    #[arg(long, value_name = "ENTITY_ID", conflicts_with_all = ["remove", "list"])]
    edit: Option<String>,

    /// Remove a configuration
    #[arg(long, value_name = "ENTITY_ID", conflicts_with = "list")]
    remove: Option<String>,

    /// List stored configurations
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("historical_stats=warn")),
        )
        .init();

    let args = Args::parse();
    let db = match &args.db {
        Some(path) => Database::open_at(path)?,
        None => Database::open()?,
    };

    if args.list {
        list(&db)
    } else if let Some(entity_id) = &args.remove {
        remove(&db, entity_id)
    } else if let Some(entity_id) = &args.edit {
        edit(&db, entity_id)
    } else {
        create(&db)
    }
}

fn list(db: &Database) -> Result<()> {
    let configs = db.list_configurations()?;
    if configs.is_empty() {
        println!("No configurations stored.");
        return Ok(());
    }
    for config in configs {
        println!("📊 {} ({})", entry_title(&config), config.entity_id);
        println!("   Update interval: {} min", config.update_interval);
        for line in config.points.summary() {
            println!("   {}", line);
        }
    }
    Ok(())
}

fn remove(db: &Database, entity_id: &str) -> Result<()> {
    if db.delete_configuration(entity_id)? {
        println!("❌ Removed configuration for {}", entity_id);
    } else {
        println!("⚠️  No configuration for {}", entity_id);
    }
    Ok(())
}

fn create(db: &Database) -> Result<()> {
    let settings = Settings::load(db);
    let mut flow = ConfigFlow::new(db, db, settings.default_update_interval_mins);

    println!("\n{}", EN.text("step.select_entity.title"));
    loop {
        let entity_id = get_input(&format!("{}: ", EN.text("step.select_entity.data.entity_id")))?;
        match flow.select_entity(&entity_id) {
            Ok(_) => break,
            Err(e) => report(&e),
        }
    }

    println!("\n{}", EN.text("step.set_details.title"));
    loop {
        let raw = get_input(&format!(
            "{} [{}]: ",
            EN.text("step.set_details.data.update_interval"),
            flow.update_interval()
        ))?;
        let update_interval = if raw.is_empty() {
            flow.update_interval()
        } else {
            match raw.parse() {
                Ok(v) => v,
                Err(_) => {
                    println!("❌ {}", EN.text("error.update_interval_range"));
                    continue;
                }
            }
        };
        let name = get_input(&format!(
            "{}: ",
            EN.text("step.set_details.data.friendly_name")
        ))?;
        let input = DetailsInput {
            update_interval,
            friendly_name: Some(name).filter(|n| !n.is_empty()),
        };
        match flow.set_details(input) {
            Ok(_) => break,
            Err(e) => report(&e),
        }
    }

    let mut editor = CreateEditor(&mut flow);
    edit_points(&mut editor)?;

    let config = flow.finalize()?;
    db.save_configuration(&config)?;
    println!("\n✅ Saved \"{}\"", entry_title(&config));
    Ok(())
}

fn edit(db: &Database, entity_id: &str) -> Result<()> {
    let Some(config) = db.get_configuration(entity_id)? else {
        println!("⚠️  No configuration for {}", entity_id);
        return Ok(());
    };

    let mut flow = OptionsFlow::new(&config);
    edit_points(&mut flow)?;

    let updated = flow.finish();
    db.save_configuration(&updated)?;
    println!("\n✅ Updated \"{}\"", entry_title(&updated));
    Ok(())
}

/// Point list operations shared by the creation and options flows.
trait PointEditor {
    fn listing(&self) -> String;
    fn point(&self, index: usize) -> Option<MeasurementPoint>;
    fn is_empty(&self) -> bool;
    fn add(&mut self, input: PointInput) -> std::result::Result<(), WizardError>;
    fn replace(
        &mut self,
        index: usize,
        point: MeasurementPoint,
    ) -> std::result::Result<(), WizardError>;
    fn remove(&mut self, indices: &BTreeSet<usize>);
}

struct CreateEditor<'f, 'a>(&'f mut ConfigFlow<'a>);

impl PointEditor for CreateEditor<'_, '_> {
    fn listing(&self) -> String {
        let points = self.0.points();
        if points.is_empty() {
            EN.text("step.edit_list.empty")
        } else {
            points.summary().join("\n")
        }
    }

    fn point(&self, index: usize) -> Option<MeasurementPoint> {
        self.0.points().get(index).cloned()
    }

    fn is_empty(&self) -> bool {
        self.0.points().is_empty()
    }

    fn add(&mut self, input: PointInput) -> std::result::Result<(), WizardError> {
        self.0.add_point(input, Utc::now()).map(|_| ())
    }

    fn replace(
        &mut self,
        index: usize,
        point: MeasurementPoint,
    ) -> std::result::Result<(), WizardError> {
        self.0.edit_point(index, point, Utc::now()).map(|_| ())
    }

    fn remove(&mut self, indices: &BTreeSet<usize>) {
        if let Err(e) = self.0.remove_points(indices) {
            report(&e);
        }
    }
}

impl PointEditor for OptionsFlow {
    fn listing(&self) -> String {
        self.current_points()
    }

    fn point(&self, index: usize) -> Option<MeasurementPoint> {
        self.points().get(index).cloned()
    }

    fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    fn add(&mut self, input: PointInput) -> std::result::Result<(), WizardError> {
        self.add_point(input, Utc::now())
    }

    fn replace(
        &mut self,
        index: usize,
        point: MeasurementPoint,
    ) -> std::result::Result<(), WizardError> {
        self.edit_point(index, point, Utc::now()).map(|_| ())
    }

    fn remove(&mut self, indices: &BTreeSet<usize>) {
        self.remove_points(indices);
    }
}

fn edit_points(editor: &mut impl PointEditor) -> Result<()> {
    if editor.is_empty() {
        add_point(editor)?;
    }

    loop {
        println!("\n{}", EN.text("step.edit_list.title"));
        println!("{}", editor.listing());
        println!();
        println!("  [a] {}", EN.text("step.edit_list.data.add_point"));
        println!("  [e] {}", EN.text("step.edit_list.data.edit_index"));
        println!("  [r] {}", EN.text("step.edit_list.data.remove_indices"));
        println!("  [f] {}", EN.text("step.edit_list.data.finish"));

        match get_input("> ")?.as_str() {
            "a" => add_point(editor)?,
            "e" => edit_point(editor)?,
            "r" => {
                let raw = get_input("Point numbers (e.g. 1,3): ")?;
                let indices: BTreeSet<usize> = raw
                    .split(',')
                    .filter_map(|s| s.trim().parse::<usize>().ok())
                    .filter_map(|n| n.checked_sub(1))
                    .collect();
                editor.remove(&indices);
            }
            "f" if editor.is_empty() => println!("❌ {}", EN.text("error.no_points")),
            "f" => return Ok(()),
            _ => println!("❌ Invalid choice. Please enter a, e, r or f."),
        }
    }
}

fn add_point(editor: &mut impl PointEditor) -> Result<()> {
    println!("\n{}", EN.text("step.add_point.title"));
    println!("{}", EN.text("step.add_point.description"));
    loop {
        let stat_types = read_stat_types()?;
        let (time_unit, time_value) = read_start()?;
        let mut input = PointInput::new(stat_types, time_unit, time_value);
        if let Some((unit_to, value_to)) = read_end()? {
            input = input.ending(unit_to, value_to);
        }
        match editor.add(input) {
            Ok(()) => return Ok(()),
            Err(e) => report(&e),
        }
    }
}

fn edit_point(editor: &mut impl PointEditor) -> Result<()> {
    let raw = get_input("Point number: ")?;
    let Some(index) = raw.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) else {
        println!("❌ Invalid point number.");
        return Ok(());
    };
    let Some(current) = editor.point(index) else {
        println!("❌ Invalid point number.");
        return Ok(());
    };

    println!("\n{}: {}", EN.text("step.edit_point.title"), current.describe());
    loop {
        let stat_type = loop {
            let raw = get_input(&format!(
                "{} [{}]: ",
                EN.text("step.add_point.data.stat_types"),
                current.stat_type
            ))?;
            if raw.is_empty() {
                break current.stat_type;
            }
            match StatType::parse(&raw) {
                Some(stat) => break stat,
                None => println!("❌ Unknown statistic: {}", raw),
            }
        };
        let (time_unit, time_value) = read_start()?;
        let mut point = MeasurementPoint::new(stat_type, time_unit, time_value);
        if let Some((unit_to, value_to)) = read_end()? {
            point = point.ending(unit_to, value_to);
        }
        match editor.replace(index, point) {
            Ok(()) => return Ok(()),
            Err(e) => report(&e),
        }
    }
}

fn read_stat_types() -> Result<Vec<StatType>> {
    let choices = StatType::ALL
        .iter()
        .map(|s| format!("{} ({})", s, EN.stat_type(*s)))
        .collect::<Vec<_>>()
        .join(", ");
    println!("  {}", choices);
    loop {
        let raw = get_input(&format!("{}: ", EN.text("step.add_point.data.stat_types")))?;
        let parsed: Option<Vec<StatType>> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(StatType::parse)
            .collect();
        match parsed {
            Some(stats) => return Ok(stats),
            None => println!("❌ Unknown statistic in: {}", raw),
        }
    }
}

fn read_unit(prompt: &str) -> Result<Option<TimeUnit>> {
    loop {
        let raw = get_input(prompt)?;
        if raw.is_empty() {
            return Ok(None);
        }
        match TimeUnit::parse(&raw) {
            Some(unit) => return Ok(Some(unit)),
            None => println!("❌ Unknown time unit: {}", raw),
        }
    }
}

fn read_value(prompt: &str) -> Result<u32> {
    loop {
        let raw = get_input(prompt)?;
        match raw.parse() {
            Ok(v) => return Ok(v),
            Err(_) => println!("❌ Enter a whole number."),
        }
    }
}

fn read_start() -> Result<(TimeUnit, u32)> {
    let units = TimeUnit::ALL
        .iter()
        .map(|u| u.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let prompt = format!("{} ({}) [days]: ", EN.text("step.add_point.data.time_unit"), units);
    let unit = read_unit(&prompt)?.unwrap_or(TimeUnit::Days);
    if unit == TimeUnit::All {
        return Ok((unit, 0));
    }
    let value = read_value(&format!("{}: ", EN.text("step.add_point.data.time_value")))?;
    Ok((unit, value))
}

fn read_end() -> Result<Option<(TimeUnit, u32)>> {
    let prompt = format!("{}: ", EN.text("step.add_point.data.time_unit_to"));
    let Some(unit) = read_unit(&prompt)? else {
        return Ok(None);
    };
    let value = read_value(&format!("{}: ", EN.text("step.add_point.data.time_value_to")))?;
    Ok(Some((unit, value)))
}

fn report(error: &WizardError) {
    println!("❌ {}", EN.error(error));
}

/// Reads one trimmed line. Fails on end of input.
fn get_input(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Err("unexpected end of input".into());
    }
    Ok(input.trim().to_string())
}
