use deskpulse_core::{Domain, SqliteStore};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("deskpulse/store.db")
    }

    fn seed_tickets(&self, rows: &[(&str, &str, &str)]) {
        let store = SqliteStore::open("primary", &self.db_path()).expect("failed to open store");
        store.migrate().expect("failed to migrate store");
        let rows: Vec<_> = rows
            .iter()
            .map(|(id, owner, created)| {
                serde_json::json!({
                    "Ticket ID": id,
                    "Ticket owner": owner,
                    "Create date": created,
                    "Pipeline": "Support Pipeline",
                })
                .as_object()
                .cloned()
                .expect("fixture row is an object")
            })
            .collect();
        store
            .upsert_rows(Domain::Tickets, &rows)
            .expect("failed to seed tickets");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("deskpulse"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute deskpulse: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "deskpulse {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn json_stdout(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}):\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn widgets_lists_the_catalogue() {
    let env = CliTestEnv::new();

    let args = ["widgets"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in [
        "weekly_response_time_trends",
        "volume_daily_historic",
        "tickets_by_pipeline",
        "weekday_weekend_distribution",
        "agent_ticket_volume_distribution",
        "agent_response_time_comparison",
        "weekly_response_breakdown",
    ] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
    assert!(stdout.contains("all|ytd|13w|52w|26w|12w|8w|4w|7d"));
}

#[test]
fn window_json_for_all_is_unbounded() {
    let env = CliTestEnv::new();

    let args = ["--format", "json", "window", "all", "--domain", "chats"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let window = json_stdout(&output);
    assert!(window["start"].is_null());
    assert!(window["end"].is_null());
    assert_eq!(window["timezone"], "America/Halifax");
}

#[test]
fn window_for_weeks_has_a_start() {
    let env = CliTestEnv::new();

    let args = ["--format", "json", "window", "12w"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let window = json_stdout(&output);
    assert!(window["start"].is_string());
    assert_eq!(window["timezone"], "America/New_York");
}

#[test]
fn render_reads_seeded_store() {
    let env = CliTestEnv::new();
    env.seed_tickets(&[
        ("1", "Nova", "2020-03-04T14:00:00Z"),
        ("2", "nora n", "2020-03-05T14:00:00Z"),
        ("3", "Girly", "2020-03-05T15:00:00Z"),
        ("4", "Spencer", "2020-03-06T15:00:00Z"),
    ]);

    let args = [
        "--format",
        "json",
        "render",
        "agent_ticket_volume_distribution",
        "--param",
        "range=all",
        "--param",
        "agents=Nova,Girly",
    ];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let rendered = json_stdout(&output);
    assert_eq!(rendered["tier"], "primary");
    assert_eq!(rendered["records"], 3);
    assert_eq!(rendered["output"]["labels"], serde_json::json!(["Nova", "Girly"]));
    assert_eq!(rendered["output"]["series"][0]["values"], serde_json::json!([2.0, 1.0]));
}

#[test]
fn render_with_no_data_is_empty_not_an_error() {
    let env = CliTestEnv::new();

    let args = ["render", "tickets_by_pipeline", "--param", "range=4w"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("records: 0"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("No data for this window."));
}

#[test]
fn render_unknown_widget_fails() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["render", "no_such_widget"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("widget not found: no_such_widget"),
        "unexpected stderr:\n{stderr}"
    );
}

#[test]
fn sync_requires_enabled_ticket_source() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["sync", "--range", "4w"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ticket source is not enabled"), "unexpected stderr:\n{stderr}");
}

#[test]
fn invalid_config_is_reported() {
    let env = CliTestEnv::new();
    let config_dir = env.xdg_config.join("deskpulse");
    fs::create_dir_all(&config_dir).expect("failed to create config dir");
    fs::write(
        config_dir.join("config.toml"),
        "[ticket_source]\nenabled = true\n",
    )
    .expect("failed to write config");

    let output = run_bin(&env, &["widgets"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("access_token"), "unexpected stderr:\n{stderr}");
}

#[test]
fn logs_go_to_rotated_file_in_state_dir() {
    let env = CliTestEnv::new();
    let config_dir = env.xdg_config.join("deskpulse");
    fs::create_dir_all(&config_dir).expect("failed to create config dir");
    fs::write(config_dir.join("config.toml"), "[logging]\nlevel = \"debug\"\n")
        .expect("failed to write config");

    let args = ["widgets"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(!String::from_utf8_lossy(&output.stdout).contains("Logging initialized"));

    let log_dir = env.xdg_state.join("deskpulse");
    let logs: Vec<_> = fs::read_dir(&log_dir)
        .expect("log dir should exist")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("deskpulse.log"))
        .collect();
    assert_eq!(logs.len(), 1, "expected one log file in {}", log_dir.display());

    let contents = fs::read_to_string(logs[0].path()).expect("failed to read log");
    assert!(contents.contains("Logging initialized"), "unexpected log:\n{contents}");
    assert!(contents.contains("deskpulse starting"), "unexpected log:\n{contents}");
}
