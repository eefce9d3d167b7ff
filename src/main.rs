//! dx7 - FM synthesis in the manner of the Yamaha DX7

use std::io::Read;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use dx7::config::{self, Dx7Config};
use dx7::midi::{self, MidiListener};
use dx7::synth::algorithm;
use dx7::sysex::{BulkDump, Sysex};
use dx7::{rpc, Dx7, ScsynthClient};
use serde::Serialize;

mod cli;

use cli::{Cli, Commands, DumpFormat};

/// Everything `dump` prints
#[derive(Serialize)]
struct Dump {
    header: Sysex,
    voices: Vec<BulkDump>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            config: config_path,
            preset,
            algorithm,
            midi,
            dump_osc,
        } => {
            let mut cfg = load_or_default(&config_path)?;
            if preset.is_some() {
                cfg.synth.preset = preset;
            }
            if algorithm.is_some() {
                cfg.synth.algorithm = algorithm;
            }
            if midi.is_some() {
                cfg.midi.device = midi;
            }
            cfg.engine.dump_osc |= dump_osc;
            cfg.validate()?;

            play(cfg)?;
        }

        Commands::Devices => {
            println!("MIDI input ports:");
            let ports = midi::list_midi_ports()?;
            if ports.is_empty() {
                println!("  (none)");
            }
            for (i, name) in ports.iter().enumerate() {
                println!("  {}: {}", i, name);
            }
        }

        Commands::Dump { file, format } => {
            let sysex = match &file {
                Some(path) => {
                    let file = std::fs::File::open(path)
                        .with_context(|| format!("opening {}", path.display()))?;
                    Sysex::read(std::io::BufReader::new(file))?
                }
                None => {
                    let mut bytes = Vec::new();
                    std::io::stdin().read_to_end(&mut bytes)?;
                    Sysex::parse(&bytes)?
                }
            };
            let dump = Dump {
                voices: sysex.bank()?,
                header: sysex,
            };
            match format {
                DumpFormat::Json => println!("{}", serde_json::to_string_pretty(&dump)?),
                DumpFormat::Yaml => print!("{}", serde_yaml::to_string(&dump)?),
            }
        }

        Commands::Synthdef {
            algorithm: index,
            output,
            channels,
        } => {
            let compiled =
                algorithm::compile_with_channels(index, algorithm::DX7_OPERATORS, channels)?;
            let path = output.unwrap_or_else(|| format!("{}.scsyndef", compiled.name()).into());
            std::fs::write(&path, compiled.synthdef.to_bytes()?)
                .with_context(|| format!("writing {}", path.display()))?;
            println!(
                "Wrote {} (algorithm {}, {} ugens) to {:?}",
                compiled.name(),
                index,
                compiled.synthdef.ugens().len(),
                path
            );
        }

        Commands::Check { config: config_path } => {
            println!("Checking configuration at {:?}...", config_path);

            match config::load_config(&config_path) {
                Ok(cfg) => {
                    println!("Configuration is valid!");
                    println!("  scsynth: {} (group {})", cfg.engine.scsynth_addr, cfg.engine.group);
                    println!("  Channels: {}", cfg.engine.channels);
                    println!(
                        "  MIDI: {} on {}",
                        cfg.midi.device.as_deref().unwrap_or("first port"),
                        cfg.midi
                            .channel
                            .map_or("all channels".to_string(), |c| format!("channel {}", c))
                    );
                    println!("  Presets: {}", cfg.synth.presets_dir);
                    println!("  Preset: {}", cfg.synth.preset.as_deref().unwrap_or("(none)"));
                    if let Some(algorithm) = cfg.synth.algorithm {
                        println!("  Algorithm: {}", algorithm);
                    }
                    println!("  Polyphony: {}", cfg.synth.polyphony);
                    println!("  Controls: {}", cfg.controls.len());
                    for control in &cfg.controls {
                        println!(
                            "    - CC {} -> {} ({:?}, {} to {})",
                            control.cc, control.param, control.curve, control.min, control.max
                        );
                    }
                    if let Some(listen) = &cfg.rpc.listen {
                        println!("  RPC: {}", listen);
                    }
                }
                Err(e) => {
                    println!("Configuration is invalid: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Init => {
            let example_config = include_str!("../dx7.example.yaml");

            let path = "dx7.yaml";
            if Path::new(path).exists() {
                println!("dx7.yaml already exists. Not overwriting.");
            } else {
                std::fs::write(path, example_config)?;
                println!("Created dx7.yaml with example configuration.");
            }
        }
    }

    Ok(())
}

fn load_or_default(path: &Path) -> Result<Dx7Config> {
    if path.exists() {
        log::info!("loading configuration from {:?}", path);
        config::load_config(path)
    } else {
        log::warn!("{:?} not found, using default configuration", path);
        Ok(Dx7Config::default())
    }
}

fn play(cfg: Dx7Config) -> Result<()> {
    let client = Arc::new(
        ScsynthClient::connect(&cfg.engine)
            .with_context(|| format!("connecting to scsynth at {}", cfg.engine.scsynth_addr))?,
    );
    let dx7 = Arc::new(Dx7::new(client.clone(), &cfg));

    if let Some(ends) = client.voice_ends() {
        let dx7 = dx7.clone();
        thread::Builder::new()
            .name("voice-ends".to_string())
            .spawn(move || {
                while let Ok(id) = ends.recv() {
                    dx7.voice_ended(id);
                }
            })?;
    }

    match &cfg.synth.preset {
        Some(preset) => dx7.load_preset(preset)?,
        None => dx7.select_algorithm(cfg.synth.algorithm.unwrap_or(1))?,
    }

    let runtime = match &cfg.rpc.listen {
        Some(addr) => {
            let rt = tokio::runtime::Runtime::new()?;
            let listener = rt.block_on(rpc::bind(addr))?;
            let dx7 = dx7.clone();
            rt.spawn(async move {
                if let Err(e) = rpc::serve(listener, dx7).await {
                    log::error!("rpc server stopped: {}", e);
                }
            });
            Some(rt)
        }
        None => None,
    };

    let midi_input = MidiListener::start(cfg.midi.device.as_deref(), cfg.midi.channel, dx7.clone());
    let listener = match midi_input {
        Ok(listener) => Some(listener),
        // Remote control alone is enough to play
        Err(e) if runtime.is_some() => {
            log::warn!("MIDI input unavailable: {}", e);
            None
        }
        Err(e) => return Err(e),
    };

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;
    println!("Playing. Press Ctrl-C to stop.");
    let _ = stop_rx.recv();

    log::info!("shutting down");
    drop(listener);
    if let Some(rt) = runtime {
        rt.shutdown_background();
    }
    dx7.release_all()?;
    Ok(())
}
