// This is my main entry point for the CeroCoin node binary
use cerocoin::{Command, KeyPair, Node, Opt};
use clap::Parser;
use log::{error, LevelFilter};
use std::process;

fn main() {
    // I initialize logging first so I can watch the miner, the
    // transactor and the block traffic interleave on the terminal
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    // I run the actual command and handle any errors that might occur.
    // If something goes wrong, I log the error and exit with code 1
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        // Starting a node: resolve the configuration, generate the
        // identity, and hand control to the worker threads
        Command::Run { .. } => {
            let config = command
                .node_config()?
                .expect("run command always resolves a config");
            let node = Node::new(config)?;
            node.run()?;
        }
        // Generating a key pair without starting a node, for looking at
        // the key material or pre-provisioning a machine
        Command::Keygen {
            modulus_bits,
            out_dir,
        } => {
            let keys = KeyPair::generate(modulus_bits)?;
            let (pub_path, priv_path) = keys.write_to_files(&out_dir)?;
            println!("Node id: {}", keys.node_id());
            println!("Public key written to {}", pub_path.display());
            println!("Private key written to {}", priv_path.display());
        }
    }
    Ok(())
}
