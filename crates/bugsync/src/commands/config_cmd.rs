//! Config subcommand handlers.

use bugsync_config::{Config, Profile};
use bugsync_core::EngineConfig;

use crate::cli::{ConfigArgs, ConfigCommand, ConfigInitArgs, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init(init_args) => init(init_args, global),

        ConfigCommand::Show => {
            let mut cfg = bugsync_config::load_config()?;
            redact(&mut cfg);
            let out = match global.output {
                OutputFormat::Table => toml::to_string_pretty(&cfg)
                    .map_err(|e| CliError::Render(e.to_string()))?,
                _ => output::render_single(
                    &global.output,
                    &cfg,
                    |_| String::new(),
                    |c| c.default_profile_name().to_owned(),
                )?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
    }
}

fn init(args: ConfigInitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    // Rejects URLs the engine could not use later.
    EngineConfig::from_server(&args.url)?;

    let mut cfg = bugsync_config::load_config()?;
    if cfg.profiles.contains_key(&args.name) && !args.force {
        return Err(CliError::Validation {
            field: "name".into(),
            reason: format!("profile '{}' already exists (use --force to replace it)", args.name),
        });
    }

    let profile = Profile {
        server: args.url,
        token_env: args.token_env,
        reconnect: args.reconnect.then_some(true),
        ..Profile::default()
    };
    cfg.profiles.insert(args.name.clone(), profile);
    if args.set_default || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(args.name.clone());
    }

    let path = config::config_path();
    bugsync_config::save_config_to(&cfg, &path)?;

    output::print_note(
        &format!(
            "Profile '{}' written to {}\nStore a token with: bugsync login --token <TOKEN>",
            args.name,
            path.display()
        ),
        global.quiet,
    );
    Ok(())
}

/// Hide plaintext tokens before printing.
fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }
}
