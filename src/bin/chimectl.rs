use chime_scheduler_sdk::{
    Alarm, ChimeSDK, CreateAlarmInput, GetOwnerAlarmsInput, GetSuggestionsInput, RecurrenceRule,
    SuggestionResult, UpdateAlarmInput, ID,
};
use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use std::error::Error;

#[derive(Parser)]
#[command(name = "chimectl")]
#[command(about = "Schedule alarms and find free time with a chime server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Address of the chime server
    #[arg(long, env = "CHIME_ADDRESS", default_value = "http://localhost:5000")]
    address: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a new alarm
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        message: String,
        /// First occurrence as an RFC 3339 instant
        #[arg(long, value_parser = parse_instant)]
        at: Option<i64>,
        /// IANA timezone of the owner
        #[arg(long)]
        timezone: Option<String>,
        /// Chat channel the alarm belongs to
        #[arg(long)]
        channel: Option<String>,
        #[command(flatten)]
        recurrence: RecurrenceArgs,
    },
    /// Show one alarm
    Get { alarm_id: ID },
    /// List the alarms of an owner
    List {
        #[arg(long)]
        owner: String,
        /// Include fired, failed and cancelled alarms
        #[arg(long)]
        include_past: bool,
    },
    /// Change an alarm
    Update {
        alarm_id: ID,
        #[arg(long)]
        message: Option<String>,
        #[arg(long, value_parser = parse_instant)]
        at: Option<i64>,
        #[arg(long)]
        timezone: Option<String>,
        #[command(flatten)]
        recurrence: RecurrenceArgs,
        /// Turn a recurring alarm into a one-off alarm
        #[arg(long)]
        remove_recurrence: bool,
    },
    /// Cancel an alarm
    Cancel { alarm_id: ID },
    /// Delete a fired, failed or cancelled alarm
    Delete { alarm_id: ID },
    /// Suggest when to do something
    Suggest {
        /// Length of the slot in minutes
        #[arg(long)]
        minutes: i64,
        #[arg(long, value_parser = parse_instant)]
        from: i64,
        #[arg(long, value_parser = parse_instant)]
        to: i64,
        /// Busy interval as `START/END` in RFC 3339, repeatable
        #[arg(long, value_parser = parse_interval)]
        busy: Vec<(i64, i64)>,
        /// Pending alarms of this owner count as busy
        #[arg(long)]
        owner: Option<String>,
        /// Free text hint for the language model
        #[arg(long)]
        hint: Option<String>,
        #[arg(long)]
        timezone: Option<String>,
        #[arg(long)]
        max: Option<usize>,
    },
}

#[derive(Args)]
struct RecurrenceArgs {
    /// Repeat every day at HH:MM
    #[arg(long, value_parser = parse_time, group = "rule")]
    daily: Option<NaiveTime>,
    /// Repeat on these weekdays, e.g. `mon,wed`, at `--time`
    #[arg(long, value_parser = parse_weekday, value_delimiter = ',', requires = "time", group = "rule")]
    weekly: Vec<Weekday>,
    #[arg(long, value_parser = parse_time)]
    time: Option<NaiveTime>,
    /// Repeat every N minutes counted from `--at`
    #[arg(long, group = "rule")]
    every_minutes: Option<i64>,
    /// Cron expression with 5, 6 or 7 fields
    #[arg(long, group = "rule")]
    cron: Option<String>,
}

impl RecurrenceArgs {
    fn rule(self, anchor_ts: i64) -> Option<RecurrenceRule> {
        if let Some(time) = self.daily {
            return Some(RecurrenceRule::Daily {
                time,
                timezone: None,
            });
        }
        if let (false, Some(time)) = (self.weekly.is_empty(), self.time) {
            return Some(RecurrenceRule::Weekly {
                weekdays: self.weekly,
                time,
                timezone: None,
            });
        }
        if let Some(minutes) = self.every_minutes {
            return Some(RecurrenceRule::Interval {
                every_millis: minutes * 60 * 1000,
                anchor_ts,
            });
        }
        self.cron.map(|expression| RecurrenceRule::Cron { expression })
    }
}

fn parse_instant(s: &str) -> Result<i64, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| format!("`{}` is not an RFC 3339 instant: {}", s, e))
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| format!("`{}` is not a HH:MM time", s))
}

fn parse_weekday(s: &str) -> Result<Weekday, String> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| format!("`{}` is not a weekday", s))
}

fn parse_interval(s: &str) -> Result<(i64, i64), String> {
    let (start, end) = s
        .split_once('/')
        .ok_or_else(|| format!("`{}` is not a START/END interval", s))?;
    Ok((parse_instant(start)?, parse_instant(end)?))
}

fn format_ts(ts: i64, timezone: &str) -> String {
    let tz = timezone.parse::<Tz>().unwrap_or(Tz::UTC);
    match tz.timestamp_millis_opt(ts).single() {
        Some(dt) => dt.to_rfc3339(),
        None => ts.to_string(),
    }
}

fn print_alarm(alarm: &Alarm) {
    println!(
        "{}  {:<9}  {}  {}",
        alarm.id,
        format!("{:?}", alarm.status).to_lowercase(),
        format_ts(alarm.scheduled_ts, &alarm.timezone),
        alarm.message
    );
    if let Some(error) = &alarm.last_error {
        println!("    last error: {}", error);
    }
}

fn print_suggestions(result: &SuggestionResult, timezone: &str) {
    if result.degraded {
        println!("(the language model was unavailable, showing heuristic suggestions only)");
    }
    if result.candidates.is_empty() {
        println!("No free slot found");
    }
    for candidate in &result.candidates {
        println!(
            "{} - {}  {:.2}  {:?}",
            format_ts(candidate.start_ts, timezone),
            format_ts(candidate.end_ts, timezone),
            candidate.confidence,
            candidate.source
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let sdk = ChimeSDK::new(cli.address);

    match cli.command {
        Commands::Create {
            owner,
            message,
            at,
            timezone,
            channel,
            recurrence,
        } => {
            let anchor_ts = at.unwrap_or_else(|| Utc::now().timestamp_millis());
            let res = sdk
                .alarm
                .create(CreateAlarmInput {
                    owner_id: owner,
                    channel_id: channel,
                    message,
                    scheduled_ts: at,
                    timezone,
                    recurrence: recurrence.rule(anchor_ts),
                })
                .await?;
            print_alarm(&res.alarm);
        }
        Commands::Get { alarm_id } => print_alarm(&sdk.alarm.get(alarm_id).await?.alarm),
        Commands::List {
            owner,
            include_past,
        } => {
            let res = sdk
                .alarm
                .get_by_owner(GetOwnerAlarmsInput {
                    owner_id: owner,
                    include_past,
                })
                .await?;
            res.alarms.iter().for_each(print_alarm);
        }
        Commands::Update {
            alarm_id,
            message,
            at,
            timezone,
            recurrence,
            remove_recurrence,
        } => {
            let anchor_ts = at.unwrap_or_else(|| Utc::now().timestamp_millis());
            let res = sdk
                .alarm
                .update(UpdateAlarmInput {
                    alarm_id,
                    message,
                    scheduled_ts: at,
                    timezone,
                    recurrence: recurrence.rule(anchor_ts),
                    remove_recurrence,
                })
                .await?;
            print_alarm(&res.alarm);
        }
        Commands::Cancel { alarm_id } => print_alarm(&sdk.alarm.cancel(alarm_id).await?.alarm),
        Commands::Delete { alarm_id } => print_alarm(&sdk.alarm.delete(alarm_id).await?.alarm),
        Commands::Suggest {
            minutes,
            from,
            to,
            busy,
            owner,
            hint,
            timezone,
            max,
        } => {
            let display_tz = timezone.clone().unwrap_or_else(|| "UTC".into());
            let res = sdk
                .suggestion
                .get(GetSuggestionsInput {
                    owner_id: owner,
                    busy,
                    duration: minutes * 60 * 1000,
                    start_ts: from,
                    end_ts: to,
                    hint,
                    timezone,
                    max_candidates: max,
                })
                .await?;
            print_suggestions(&res, &display_tz);
        }
    }

    Ok(())
}
