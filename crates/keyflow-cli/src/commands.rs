use crate::cli::Commands;
use keyflow_core::storage::{JsonProfileStore, ProfileStore};
use keyflow_core::{validate_profile, KeyflowError, ProfileId, Result};
use keyflow_daemon::{daemon_status, daemon_worker_entry, start_daemon, stop_daemon};

pub fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Start {
            foreground,
            backend,
        } => start_daemon(foreground, backend),
        Commands::Stop => stop_daemon(),
        Commands::Status => daemon_status(),
        Commands::DaemonWorker => daemon_worker_entry(),
        other => handle_store_command(&JsonProfileStore::open_default()?, other),
    }
}

/// Resolve an optional `--profile` argument against the active profile.
fn target_profile(store: &JsonProfileStore, profile: Option<String>) -> Result<ProfileId> {
    match profile {
        Some(name) => Ok(ProfileId::from(name)),
        None => store.load_active_profile_id(),
    }
}

/// Commands that only edit `profiles.json`. A running daemon picks the
/// change up on its next reload.
pub fn handle_store_command(store: &JsonProfileStore, command: Commands) -> Result<()> {
    match command {
        Commands::Add {
            trigger,
            output,
            profile,
        } => {
            let profile = target_profile(store, profile)?;
            store.add_trigger(&profile, &trigger, &output)?;
            println!("Trigger '{}' added to profile '{}'", trigger, profile);
        }
        Commands::Update {
            trigger,
            output,
            profile,
        } => {
            let profile = target_profile(store, profile)?;
            store.update_trigger(&profile, &trigger, &output)?;
            println!("Trigger '{}' updated", trigger);
        }
        Commands::Delete { trigger, profile } => {
            let profile = target_profile(store, profile)?;
            store.delete_trigger(&profile, &trigger)?;
            println!("Trigger '{}' deleted", trigger);
        }
        Commands::List { profile } => {
            let profile = target_profile(store, profile)?;
            let triggers = store.list_triggers(&profile)?;
            if triggers.is_empty() {
                println!("Profile '{}' has no triggers", profile);
            }
            for trigger in triggers {
                println!("{:<16} {}", trigger.pattern, preview(&trigger.output));
            }
        }
        Commands::Profiles => {
            let document = store.load()?;
            for profile in document.to_profiles() {
                let marker = if profile.id == document.current_profile { "*" } else { " " };
                let state = if profile.enabled { "" } else { " (disabled)" };
                println!(
                    "{} {} [{} triggers]{}",
                    marker,
                    profile.id,
                    profile.triggers.len(),
                    state
                );
            }
        }
        Commands::Use { profile } => {
            let profile = ProfileId::from(profile);
            store.set_active_profile(&profile)?;
            println!("Active profile is now '{}'", profile);
        }
        Commands::Enable { profile } => {
            store.set_profile_enabled(&ProfileId::from(profile.clone()), true)?;
            println!("Profile '{}' enabled", profile);
        }
        Commands::Disable { profile } => {
            store.set_profile_enabled(&ProfileId::from(profile.clone()), false)?;
            println!("Profile '{}' disabled", profile);
        }
        Commands::Check => check_profiles(store)?,
        Commands::Start { .. } | Commands::Stop | Commands::Status | Commands::DaemonWorker => {
            return Err(KeyflowError::Other(
                "not a profile command".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_profiles(store: &JsonProfileStore) -> Result<()> {
    let mut problems = 0;
    for profile in store.load_profiles()? {
        match validate_profile(&profile) {
            Ok(()) => println!("ok    {} ({} triggers)", profile.id, profile.triggers.len()),
            Err(err) => {
                problems += 1;
                println!("error {}: {}", profile.id, err);
            }
        }
    }

    if problems > 0 {
        return Err(KeyflowError::InvalidConfig(format!(
            "{} profile(s) have ambiguous triggers",
            problems
        )));
    }
    Ok(())
}

/// First line of an output, shortened for listing.
fn preview(output: &str) -> String {
    const MAX: usize = 60;
    let first_line = output.lines().next().unwrap_or("");
    let mut shown: String = first_line.chars().take(MAX).collect();
    if first_line.chars().count() > MAX || output.lines().count() > 1 {
        shown.push_str("...");
    }
    shown
}
