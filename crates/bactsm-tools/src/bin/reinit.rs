use bactsm_client::ReinitializeState;
use bactsm_tools::TransactionArgs;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, ValueEnum)]
enum ReinitStateArg {
    Coldstart,
    Warmstart,
    StartBackup,
    EndBackup,
    StartRestore,
    EndRestore,
    AbortRestore,
    ActivateChanges,
}

impl ReinitStateArg {
    const fn into_state(self) -> ReinitializeState {
        match self {
            Self::Coldstart => ReinitializeState::Coldstart,
            Self::Warmstart => ReinitializeState::Warmstart,
            Self::StartBackup => ReinitializeState::StartBackup,
            Self::EndBackup => ReinitializeState::EndBackup,
            Self::StartRestore => ReinitializeState::StartRestore,
            Self::EndRestore => ReinitializeState::EndRestore,
            Self::AbortRestore => ReinitializeState::AbortRestore,
            Self::ActivateChanges => ReinitializeState::ActivateChanges,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "bacnet-reinit")]
struct Args {
    #[command(flatten)]
    txn: TransactionArgs,
    #[arg(long, value_enum, default_value = "warmstart")]
    state: ReinitStateArg,
    #[arg(long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let client = args.txn.connect().await?;
    client
        .reinitialize_device(
            args.txn.recipient(),
            args.state.into_state(),
            args.password.as_deref(),
        )
        .await?;
    println!("reinitialize-device request acknowledged");
    Ok(())
}
