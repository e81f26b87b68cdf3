//! lv2show - inspect LV2 plugins from the command line.

mod cli;

use clap::Parser;
use serde::Serialize;

use jlv2::HostConfig;
use jlv2::lv2::{
    MidiBuffer, ParameterValue, PluginInfo, PluginInstance, PortDescription, StatsSnapshot, World,
};

use cli::Cli;

#[derive(Serialize)]
struct Report<'a> {
    info: PluginInfo,
    ports: Vec<&'a PortDescription>,
    parameters: Vec<ParameterValue>,
    stats: StatsSnapshot,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> jlv2::Result<()> {
    let mut config = HostConfig::load();
    if let Some(rate) = cli.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(block) = cli.block_size {
        config.block_size = block;
    }
    config.search_paths.extend(cli.lv2_paths.iter().cloned());
    let config = config.sanitized();

    if let Some(path) = config.lv2_path() {
        log::debug!("LV2_PATH={}", path);
        // SAFETY: called before the world or any worker thread exists, so
        // nothing else reads the environment concurrently.
        unsafe { std::env::set_var("LV2_PATH", path) };
    }

    let world = World::new(config)?;
    match &cli.uri {
        None => list(&world, cli.json),
        Some(uri) => show(&world, uri, &cli),
    }
}

fn list(world: &World, json: bool) -> jlv2::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&world.scan())?);
        return Ok(());
    }
    for uri in world.plugin_uris() {
        println!("{}", uri);
    }
    Ok(())
}

fn show(world: &World, uri: &str, cli: &Cli) -> jlv2::Result<()> {
    let config = world.config();
    let mut instance = world.create_instance(uri, config.sample_rate)?;
    let handle = instance.handle();

    if let Some(path) = &cli.load_state {
        handle.set_state(&std::fs::read(path)?)?;
        log::info!("Restored state from {}", path.display());
    }

    instance.prepare(config.sample_rate, config.block_size)?;
    run_silence(&mut instance, cli.blocks, config.block_size, config.midi_buffer_capacity);
    handle.dispatch_port_events();

    if cli.json {
        let report = Report {
            info: instance.info(),
            ports: instance.ports().iter().collect(),
            parameters: handle.parameters().iter().map(|p| p.snapshot()).collect(),
            stats: handle.stats(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&instance);
    }

    if let Some(path) = &cli.save_state {
        std::fs::write(path, handle.get_state()?)?;
        log::info!("Saved state to {}", path.display());
    }

    instance.release();
    Ok(())
}

fn run_silence(instance: &mut PluginInstance, blocks: usize, block_size: usize, midi_capacity: usize) {
    let channels = instance
        .num_audio_inputs()
        .max(instance.num_audio_outputs()) as usize;
    let mut audio = vec![vec![0.0f32; block_size]; channels];
    let mut midi = MidiBuffer::new(midi_capacity);
    let handle = instance.handle();

    for _ in 0..blocks {
        for channel in &mut audio {
            channel.fill(0.0);
        }
        let mut refs: Vec<&mut [f32]> = audio.iter_mut().map(|c| c.as_mut_slice()).collect();
        instance.process(&mut refs, &mut midi, block_size);
        midi.clear();
        handle.dispatch_port_events();
    }
}

fn print_text(instance: &PluginInstance) {
    let info = instance.info();
    let handle = instance.handle();

    println!("{}", info.name);
    println!("  URI:    {}", info.uri);
    println!("  Class:  {}", info.class_label);
    if let Some(author) = &info.author {
        println!("  Author: {}", author);
    }
    println!(
        "  Kind:   {}",
        if info.is_instrument() {
            "instrument"
        } else if info.is_effect() {
            "effect"
        } else {
            "other"
        }
    );
    if !info.required_features.is_empty() {
        println!("  Requires:");
        for feature in &info.required_features {
            println!("    {}", feature);
        }
    }

    println!();
    println!("Ports:");
    for port in instance.ports() {
        println!(
            "  {:>3}  {:<7} {:<6} ch {:<2} {} ({})",
            port.index,
            port.port_type.name(),
            if port.is_input { "in" } else { "out" },
            port.channel,
            port.symbol,
            port.name
        );
    }

    println!();
    println!("Channels:");
    println!(
        "  audio {} in / {} out",
        instance.num_audio_inputs(),
        instance.num_audio_outputs()
    );
    for c in 0..instance.num_audio_inputs() {
        println!("    in  {}: {}", c, instance.input_channel_name(c));
    }
    for c in 0..instance.num_audio_outputs() {
        println!("    out {}: {}", c, instance.output_channel_name(c));
    }
    let chans = instance.channels();
    println!(
        "  control {} in / {} out, atom {} in / {} out, cv {} in / {} out",
        chans.num_control_inputs(),
        chans.num_control_outputs(),
        chans.num_atom_inputs(),
        chans.num_atom_outputs(),
        chans.num_cv_inputs(),
        chans.num_cv_outputs()
    );
    println!(
        "  midi: {}{}",
        if instance.accepts_midi() { "in " } else { "" },
        if instance.produces_midi() { "out" } else { "" }
    );

    let params = handle.parameters();
    if !params.is_empty() {
        println!();
        println!("Parameters:");
        for p in params.iter() {
            let range = p.range();
            println!(
                "  {:<24} {:>10}  [{} .. {}]",
                p.short_name(24),
                p.text_for_value(p.value()),
                range.min,
                range.max
            );
        }
    }

    let stats = handle.stats();
    println!();
    println!(
        "Processed {} blocks ({} silenced, {} rejected), avg {} ns, peak {} ns",
        stats.blocks, stats.silenced_blocks, stats.rejected_blocks, stats.avg_ns, stats.peak_ns
    );
}
