use crate::export::command::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
use crate::export::exporter::{ExportResult, Exporter};
use crate::export::function_path;
use crate::export::mime::ArtifactMime;
use crate::export::redacted::RedactedString;
use crate::export::result_error::error::Error;
use crate::export::result_error::{AddFunctionName, AddMsg};
use crate::export::validate::{validate_file_name_part, validate_out_dir};
use bon::Builder;
use chrono::{DateTime, Utc};
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Executable used when no command is configured
pub static DEFAULT_PG_DUMP_COMMAND: &str = "pg_dump";

static DATABASE_FLAG: &str = "-d";
static HOST_FLAG: &str = "-h";
static PORT_FLAG: &str = "-p";
static USERNAME_FLAG: &str = "-U";
static OUTPUT_FILE_FLAG: &str = "-f";
static PASSWORD_ENV: &str = "PGPASSWORD";

/// Exports a Postgres database through `pg_dump`
///
/// Empty connection fields are left out of the command line so `pg_dump`
/// falls back to its own defaults (`PGHOST`, `PGPORT`, ...).
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct PostgresExporter {
    /// DB host (e.g. 127.0.0.1)
    #[serde(default)]
    #[builder(default, into)]
    host: String,
    /// DB port (e.g. 5432)
    #[serde(default)]
    #[builder(default, into)]
    port: String,
    #[validate(custom(function = validate_file_name_part))]
    #[serde(default)]
    #[builder(default, into)]
    database: String,
    #[serde(default)]
    #[builder(default, into)]
    username: String,
    /// Handed to `pg_dump` through `PGPASSWORD`, never on the command line
    #[serde(default)]
    #[builder(into)]
    password: Option<RedactedString>,
    /// Extra `pg_dump` options, e.g. `["--inserts"]`
    #[serde(default)]
    #[builder(default, into)]
    options: Vec<String>,
    #[serde(default = "default_command")]
    #[builder(default = default_command(), into)]
    command: PathBuf,
    #[validate(custom(function = validate_out_dir))]
    #[serde(default)]
    #[builder(default, into)]
    out_dir: PathBuf,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

fn default_command() -> PathBuf {
    PathBuf::from(DEFAULT_PG_DUMP_COMMAND)
}

impl PostgresExporter {
    /// Caller options first, in their original order, then one combined
    /// flag per non-empty connection field.
    pub fn dump_options(&self) -> Vec<String> {
        let connection_flags = [
            (DATABASE_FLAG, &self.database),
            (HOST_FLAG, &self.host),
            (PORT_FLAG, &self.port),
            (USERNAME_FLAG, &self.username),
        ];

        self.options
            .iter()
            .cloned()
            .chain(
                connection_flags
                    .into_iter()
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(flag, value)| format!("{flag}{value}")),
            )
            .collect_vec()
    }

    /// `bu_<database>_<unix seconds>`
    ///
    /// Two exports of the same database within one second get the same name.
    pub fn artifact_name(&self, dt: DateTime<Utc>) -> String {
        format!("bu_{}_{}", self.database, dt.timestamp())
    }

    /// Runs the export through `runner` instead of spawning `pg_dump` directly.
    pub fn export_with<R: CommandRunner + ?Sized>(&self, runner: &R) -> ExportResult {
        self.export_at(runner, Utc::now())
    }

    #[named]
    fn export_at<R: CommandRunner + ?Sized>(&self, runner: &R, now: DateTime<Utc>) -> ExportResult {
        let options = self.dump_options();
        let mime = ArtifactMime::classify(&options);
        let path = self.out_dir.join(self.artifact_name(now));

        // lossless once out_dir passed validate_out_dir
        let args = options
            .into_iter()
            .chain(std::iter::once(format!(
                "{OUTPUT_FILE_FLAG}{}",
                path.to_string_lossy()
            )))
            .collect_vec();
        let envs = self
            .password
            .iter()
            .map(|password| (PASSWORD_ENV.to_string(), password.clone()))
            .collect_vec();
        let invocation = Invocation::builder()
            .program(self.command.clone())
            .args(args)
            .envs(envs)
            .build();

        tracing::info!(
            "Exporting database {:?} to {:?} as {}",
            self.database,
            path,
            mime
        );
        let CommandOutput { output, status } = runner.execute(&invocation);
        let outcome = status.map_err(|e| {
            Error::export_failed(e, output.clone())
                .add_msg(format!("Export of database {:?} failed", self.database))
                .add_fn_name(function_path!())
        });

        match &outcome {
            Ok(_) => tracing::info!("Exported database {:?} to {:?}", self.database, path),
            Err(e) => tracing::error!("{e}"),
        }

        ExportResult::new(path, mime, output, outcome)
    }
}

impl Exporter for PostgresExporter {
    fn export(&self) -> ExportResult {
        let runner = ProcessRunner::builder()
            .maybe_timeout(self.timeout)
            .build();
        self.export_with(&runner)
    }
}
