//! Command-line handling

use jacktime_core::{BackendKind, JacktimeConfig, Role};
use std::ffi::OsString;
use std::path::PathBuf;

/// Help text, also printed after argument errors
pub const USAGE: &str = "\
Monitor and follow a shared musical transport.

Usage: jacktime [master|client] [options]

Modes:
  master                 Publish transport positions (timebase master)
  client                 Follow the transport and predict beat frames

Options:
  -c, --config <PATH>    Load settings from a TOML file
  -b, --backend <NAME>   'simulated' or 'jack'
  -n, --name <NAME>      Client name registered with the sound server
  -d, --duration <SECS>  Stop the simulated transport after SECS seconds
  -h, --help             Show this help
";

/// Values given on the command line; `None` leaves the config untouched
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliOptions {
    /// `master` or `client` positional argument
    pub role: Option<Role>,
    /// `--config`
    pub config_path: Option<PathBuf>,
    /// `--backend`
    pub backend: Option<BackendKind>,
    /// `--name`
    pub client_name: Option<String>,
    /// `--duration`, in seconds
    pub duration_secs: Option<f64>,
    /// `--help` was given
    pub show_help: bool,
}

impl CliOptions {
    /// Overlay command-line values onto a loaded configuration
    pub fn apply(&self, config: &mut JacktimeConfig) {
        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(name) = &self.client_name {
            config.client_name = Some(name.clone());
        }
        if let Some(duration) = self.duration_secs {
            config.transport.duration_secs = duration;
        }
    }
}

/// Parse the process arguments, skipping the program name
pub fn parse_args<I>(args: I) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut options = CliOptions::default();
    let mut args = args
        .into_iter()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned());

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => options.show_help = true,
            "-c" | "--config" => {
                options.config_path = Some(PathBuf::from(value_for(&arg, args.next())?));
            }
            "-b" | "--backend" => {
                let value = value_for(&arg, args.next())?;
                options.backend = Some(match value.as_str() {
                    "simulated" => BackendKind::Simulated,
                    "jack" => BackendKind::Jack,
                    other => return Err(format!("unknown backend '{other}'")),
                });
            }
            "-n" | "--name" => options.client_name = Some(value_for(&arg, args.next())?),
            "-d" | "--duration" => {
                let value = value_for(&arg, args.next())?;
                let secs: f64 = value
                    .parse()
                    .map_err(|_| format!("invalid duration '{value}'"))?;
                if !(secs >= 0.0 && secs.is_finite()) {
                    return Err(format!("invalid duration '{value}'"));
                }
                options.duration_secs = Some(secs);
            }
            "master" | "client" if options.role.is_none() => {
                options.role = Some(arg.parse().map_err(|e| format!("{e}"))?);
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }

    Ok(options)
}

fn value_for(flag: &str, value: Option<String>) -> Result<String, String> {
    value.ok_or_else(|| format!("missing value for {flag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions, String> {
        parse_args(
            std::iter::once("jacktime")
                .chain(args.iter().copied())
                .map(OsString::from),
        )
    }

    #[test]
    fn test_role_and_flags() {
        let options = parse(&["master", "--config", "show.toml", "-d", "2.5"]).unwrap();
        assert_eq!(options.role, Some(Role::Master));
        assert_eq!(options.config_path, Some(PathBuf::from("show.toml")));
        assert_eq!(options.duration_secs, Some(2.5));
        assert!(!options.show_help);
    }

    #[test]
    fn test_empty_args() {
        assert_eq!(parse(&[]).unwrap(), CliOptions::default());
    }

    #[test]
    fn test_errors() {
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["--backend", "alsa"]).is_err());
        assert!(parse(&["client", "master"]).is_err());
        assert!(parse(&["-d", "-1"]).is_err());
    }

    #[test]
    fn test_apply_overrides_config() {
        let options = parse(&["master", "-b", "jack", "-n", "tb"]).unwrap();
        let mut config = JacktimeConfig::default();
        options.apply(&mut config);
        assert_eq!(config.role, Role::Master);
        assert_eq!(config.backend, BackendKind::Jack);
        assert_eq!(config.client_name(), "tb");
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jacktime.toml");
        std::fs::write(
            &path,
            "role = \"master\"\nclient_name = \"studio\"\n\n[transport]\nduration_secs = 4.0\n",
        )
        .unwrap();

        let options = parse(&["client", "-c", path.to_str().unwrap(), "-d", "1"]).unwrap();
        let mut config = JacktimeConfig::load(options.config_path.as_ref().unwrap()).unwrap();
        options.apply(&mut config);

        assert_eq!(config.role, Role::Client);
        assert_eq!(config.client_name(), "studio");
        assert_eq!(config.transport.duration_secs, 1.0);
    }
}
