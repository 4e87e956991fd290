use clap::{Parser, Subcommand};
use keyflow_core::BackendKind;

#[derive(Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = "keyflow - system-wide text expansion",
    long_about = "keyflow watches what you type and replaces trigger patterns with their expansions."
)]
pub struct Keyflow {
    #[clap(subcommand)]
    pub commands: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the expansion daemon
    Start {
        #[clap(long, short, help = "Run in this terminal instead of detaching")]
        foreground: bool,

        #[clap(long, short, help = "Keyboard hook backend: default or alternate")]
        backend: Option<BackendKind>,
    },
    /// Stop the keyflow daemon
    Stop,
    /// Check the status of the keyflow daemon
    Status,
    /// Add a new trigger
    Add {
        #[clap(long, short = 't', allow_hyphen_values = true, help = "Pattern that triggers the expansion")]
        trigger: String,

        #[clap(long, short = 'o', allow_hyphen_values = true, help = "Text that replaces the pattern")]
        output: String,

        #[clap(long, short = 'p', help = "Profile to add to (defaults to the active one)")]
        profile: Option<String>,
    },
    /// Change the output of an existing trigger
    Update {
        #[clap(long, short = 't', allow_hyphen_values = true, help = "Pattern of the trigger to update")]
        trigger: String,

        #[clap(long, short = 'o', allow_hyphen_values = true, help = "New replacement text")]
        output: String,

        #[clap(long, short = 'p')]
        profile: Option<String>,
    },
    /// Delete a trigger
    Delete {
        #[clap(long, short = 't', allow_hyphen_values = true, help = "Pattern of the trigger to delete")]
        trigger: String,

        #[clap(long, short = 'p')]
        profile: Option<String>,
    },
    /// List the triggers of a profile
    List {
        #[clap(long, short = 'p')]
        profile: Option<String>,
    },
    /// List all profiles
    Profiles,
    /// Make a profile the active one
    Use { profile: String },
    /// Include a profile in the profile-switch rotation
    Enable { profile: String },
    /// Exclude a profile from expansion and rotation
    Disable { profile: String },
    /// Check every profile for ambiguous triggers
    Check,
    // Hidden command used internally to run the daemon worker
    #[clap(hide = true)]
    DaemonWorker,
}
