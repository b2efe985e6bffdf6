use bactsm_core::types::{ObjectId, PropertyId};
use bactsm_tools::{ObjectTypeArg, TransactionArgs};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "bacnet-readprop")]
struct Args {
    #[command(flatten)]
    txn: TransactionArgs,
    #[arg(long, value_enum, default_value = "device")]
    object_type: ObjectTypeArg,
    /// Object instance; defaults to the device instance.
    #[arg(long)]
    object_instance: Option<u32>,
    /// Property name (e.g. `present-value`) or numeric identifier.
    #[arg(long, default_value = "object-name")]
    property: PropertyId,
    #[arg(long)]
    array_index: Option<u32>,
    /// Print the acknowledgement as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let client = args.txn.connect().await?;
    let object_id = ObjectId::new(
        args.object_type.into_object_type(),
        args.object_instance.unwrap_or(args.txn.instance),
    );
    let result = match args.array_index {
        Some(index) => {
            client
                .read_property_element(args.txn.recipient(), object_id, args.property, index)
                .await
        }
        None => {
            client
                .read_property(args.txn.recipient(), object_id, args.property)
                .await
        }
    };

    match result {
        Ok(ack) if args.json => println!("{}", serde_json::to_string_pretty(&ack)?),
        Ok(ack) => {
            for value in &ack.values {
                println!("{value}");
            }
        }
        Err(e) => {
            eprintln!("read failed: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}
