use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use thrum::audio::load_samples;
use thrum::sequencer::lock;
use thrum::{
    AudioOutput, Config, Dispatcher, InputEvent, LogIndicator, MidiDrumBank, MonotonicTime,
    MultiBank, PlaybackEngine, RecordIndicator, SampleBank, Sequencer, SilentBank, SOUND_COUNT,
    STEP_COUNT,
};

#[cfg(feature = "gui")]
use eframe::egui;
#[cfg(feature = "gui")]
use thrum::{Action, PlaybackEvent, SharedIndicator, STEP_BUTTON_COUNT};

#[derive(Parser, Debug)]
#[command(name = "thrum", about = "An interactive 12-step sequencer for drum samples")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tempo in beats per minute (overrides the config file)
    #[arg(long)]
    bpm: Option<f32>,

    /// Report every button press and transition
    #[arg(short, long)]
    verbose: bool,

    /// Also send each sound as a MIDI drum note on this port
    #[arg(long)]
    midi_port: Option<usize>,

    /// Print the available MIDI output ports and exit
    #[arg(long)]
    list_midi_ports: bool,

    /// Do not open the audio device
    #[arg(long)]
    no_audio: bool,

    /// Read button presses from stdin instead of opening a window
    #[arg(long)]
    headless: bool,
}

fn main() {
    let args = Args::parse();

    if args.list_midi_ports {
        for (i, name) in MidiDrumBank::available_ports().iter().enumerate() {
            println!("{}: {}", i, name);
        }
        return;
    }

    let config = load_config(&args);
    let verbose = args.verbose || config.as_ref().is_ok_and(|c| c.verbose);
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let result = config.and_then(|config| run(&args, config));
    if let Err(e) = result {
        if e.is_configuration() {
            error!("Cannot start: {}", e);
        } else {
            error!("{}", e);
        }
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> thrum::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bpm) = args.bpm {
        config.bpm = bpm;
    }
    if let Some(port) = args.midi_port {
        config.midi.port = Some(port);
    }
    config.verbose |= args.verbose;
    Ok(config)
}

#[cfg(feature = "gui")]
fn run(args: &Args, config: Config) -> thrum::Result<()> {
    if args.headless {
        return run_console(args, config);
    }

    let indicator = Arc::new(SharedIndicator::new());
    let names = sound_names(&config);
    let engine = Engine::start(args, &config, indicator.clone())?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([760.0, 420.0])
            .with_title("thrum - 12-step Sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "thrum",
        options,
        Box::new(|_cc| Ok(Box::new(SequencerApp::new(engine, indicator, names)))),
    )
    .map_err(|e| thrum::Error::Window(e.to_string()))
}

#[cfg(not(feature = "gui"))]
fn run(args: &Args, config: Config) -> thrum::Result<()> {
    run_console(args, config)
}

/// Everything that has to stay alive while the sequencer runs.
struct Engine {
    dispatcher: Dispatcher,
    playback: PlaybackEngine,
    _audio: Option<AudioOutput>,
}

impl Engine {
    fn start(args: &Args, config: &Config, indicator: Arc<dyn RecordIndicator>) -> thrum::Result<Self> {
        let tempo = config.validate()?;

        let mut banks: Vec<Arc<dyn SampleBank>> = Vec::new();
        let audio = if args.no_audio {
            None
        } else {
            let samples = load_samples(&config.samples.paths, config.samples.volume)?;
            let audio = AudioOutput::new(samples)?;
            banks.push(audio.bank());
            Some(audio)
        };
        if let Some(port) = config.midi.port {
            banks.push(Arc::new(MidiDrumBank::connect(port, &config.midi.notes)?));
        }
        let bank: Arc<dyn SampleBank> = match banks.len() {
            0 => {
                warn!("No audio or MIDI output, sounds will only be logged");
                Arc::new(SilentBank::new(SOUND_COUNT))
            }
            1 => banks.remove(0),
            _ => Arc::new(MultiBank::new(banks)?),
        };

        let sequencer = Arc::new(Mutex::new(Sequencer::new(tempo)));
        let dispatcher = Dispatcher::new(sequencer.clone(), bank.clone(), indicator)?;
        let mut playback = PlaybackEngine::new();
        playback.start(sequencer, bank, Arc::new(MonotonicTime::new()));
        info!("Sequencer ready at {} bpm", tempo.bpm());

        Ok(Self {
            dispatcher,
            playback,
            _audio: audio,
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.playback.stop();
        self.dispatcher.release();
    }
}

fn run_console(args: &Args, config: Config) -> thrum::Result<()> {
    let engine = Engine::start(args, &config, Arc::new(LogIndicator))?;

    println!("Welcome to thrum! An interactive 12-step sequencer for drum samples!");
    println!("Buttons: s0-s5 sounds, t0-t5 steps, p play, r record, g show pattern, q quit\n");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(|source| thrum::Error::Io {
            path: PathBuf::from("<stdin>"),
            source,
        })?;
        match line.trim() {
            "" => continue,
            "q" | "quit" => break,
            "g" | "show" => {
                print!("{}", render_pattern(&lock(engine.dispatcher.sequencer())));
                continue;
            }
            _ => {}
        }
        match line.parse::<InputEvent>().and_then(|event| engine.dispatcher.handle(event)) {
            Ok(action) => info!("{:?}", action),
            Err(e) => warn!("{}", e),
        }
    }

    drop(engine);
    println!("Thanks for playing!");
    Ok(())
}

/// One line per sound, one column per step, cursor marked underneath.
fn render_pattern(seq: &Sequencer) -> String {
    let mut out = String::new();
    for sound in 0..SOUND_COUNT {
        let selected = if seq.current_selection() == Some(sound) { '>' } else { ' ' };
        out.push(selected);
        out.push_str(&format!("s{} ", sound));
        for step in 0..STEP_COUNT {
            let armed = seq.grid().is_armed(step, sound).unwrap_or(false);
            out.push(if armed { 'x' } else { '.' });
        }
        out.push('\n');
    }
    out.push_str("    ");
    for step in 0..STEP_COUNT {
        out.push(if step == seq.cursor() { '^' } else { ' ' });
    }
    out.push_str(&format!(
        "\n    play={} rec={}\n",
        seq.is_playing(),
        seq.is_recording()
    ));
    out
}

#[cfg(feature = "gui")]
fn sound_names(config: &Config) -> Vec<String> {
    config
        .samples
        .paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("Sound {}", i))
        })
        .collect()
}

#[cfg(feature = "gui")]
struct SequencerApp {
    engine: Engine,
    indicator: Arc<SharedIndicator>,
    sound_names: Vec<String>,

    // UI state
    current_visual_step: Option<usize>,
    last_action: Option<Action>,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(engine: Engine, indicator: Arc<SharedIndicator>, sound_names: Vec<String>) -> Self {
        Self {
            engine,
            indicator,
            sound_names,
            current_visual_step: None,
            last_action: None,
        }
    }

    fn handle_playback_events(&mut self) {
        for event in self.engine.playback.poll_events() {
            if let PlaybackEvent::StepAdvanced(step) = event {
                self.current_visual_step = Some(step);
            }
        }
    }

    fn press(&mut self, event: InputEvent) {
        match self.engine.dispatcher.handle(event) {
            Ok(action) => self.last_action = Some(action),
            Err(e) => warn!("{}", e),
        }
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();

        // Draw from a snapshot so button handling never runs under the lock
        let (state, grid, bpm) = {
            let seq = lock(self.engine.dispatcher.sequencer());
            (seq.state().clone(), seq.grid().clone(), seq.tempo().bpm())
        };
        let mut pressed = Vec::new();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("thrum - 12-step Sequencer");
            ui.add_space(10.0);

            // Transport controls
            ui.horizontal(|ui| {
                let play_text = if state.playing { "⏸ Stop" } else { "▶ Play" };
                if ui.button(play_text).clicked() {
                    pressed.push(InputEvent::PlayButton);
                }
                if ui.button("● Rec").clicked() {
                    pressed.push(InputEvent::RecordButton);
                }

                let (rect, _) = ui.allocate_exact_size(egui::vec2(18.0, 18.0), egui::Sense::hover());
                let led = if self.indicator.is_lit() {
                    egui::Color32::from_rgb(220, 40, 40)
                } else {
                    egui::Color32::from_rgb(60, 20, 20)
                };
                ui.painter().circle_filled(rect.center(), 7.0, led);

                ui.add_space(20.0);
                ui.label(format!("BPM: {}", bpm));
                ui.add_space(20.0);
                ui.label(match state.current_selection {
                    Some(sound) => format!("Selected: {}", self.sound_names[sound]),
                    None => "Selected: none".to_string(),
                });
            });

            ui.add_space(20.0);

            // Pads: sound buttons on top, step-only buttons below
            let rows = [
                (0..SOUND_COUNT).map(InputEvent::SoundButton).collect::<Vec<_>>(),
                (0..STEP_BUTTON_COUNT).map(InputEvent::StepButton).collect::<Vec<_>>(),
            ];
            for row in rows {
                ui.horizontal(|ui| {
                    for event in row {
                        let Some(step) = event.logical_step() else {
                            continue;
                        };
                        let is_current = state.playing && self.current_visual_step == Some(step);
                        let selection_armed = state
                            .current_selection
                            .is_some_and(|sound| grid.is_armed(step, sound).unwrap_or(false));
                        let any_armed = grid.armed(step).is_ok_and(|sounds| !sounds.is_empty());

                        let label = match event {
                            InputEvent::SoundButton(sound) => {
                                format!("{}\n{}", step + 1, self.sound_names[sound])
                            }
                            _ => format!("{}", step + 1),
                        };
                        let button = egui::Button::new(label)
                            .min_size(egui::vec2(110.0, 70.0))
                            .fill(if is_current {
                                egui::Color32::from_rgb(100, 200, 100)
                            } else if selection_armed {
                                egui::Color32::from_rgb(60, 60, 200)
                            } else if any_armed {
                                egui::Color32::from_rgb(40, 40, 90)
                            } else {
                                egui::Color32::from_rgb(40, 40, 40)
                            });

                        if ui.add(button).clicked() {
                            pressed.push(event);
                        }
                    }
                });
            }

            // Info
            ui.separator();
            if state.recording {
                ui.label("Recording: pads arm or disarm the selected sound on their step");
            } else {
                ui.label("Top pads play and select a sound; press Rec to edit the pattern");
            }
            if let Some(action) = &self.last_action {
                ui.label(format!("Last: {:?}", action));
            }
        });

        for event in pressed {
            self.press(event);
        }
    }
}
