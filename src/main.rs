mod board;
mod camera;
mod config;
mod controller;
mod frame;
mod results;
mod sharpness;
mod snapshot;
mod title;
mod upload;

use anyhow::{Context, Result};
use board::{Board, BoardEvent, Section};
use camera::{Camera, FileCamera, ScreenCamera};
use chrono::{Local, NaiveDate};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use config::{AppConfig, BoardConfig, CaptureMode};
use controller::{
    CaptureButton, CaptureOutcome, ScannerController, ScannerInput, ScannerState, ScannerUpdate, TickOutcome,
};
use dialoguer::Confirm;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use upload::HttpScanUploader;

const SECTIONS: [&str; 4] = ["officials", "team1", "team2", "unassigned"];
const FRAME_TICK: Duration = Duration::from_millis(33);

fn cli() -> Command {
    let board_arg = || {
        Arg::new("board")
            .value_name("BOARD")
            .help("Board file (export format)")
            .required(true)
            .value_parser(value_parser!(PathBuf))
    };
    let date_arg = || {
        Arg::new("date")
            .long("date")
            .value_name("YYYY-MM-DD")
            .help("Match date used in the title (default: today)")
    };

    Command::new("jae-rs")
        .version("0.1.0")
        .about("Referee desk: roster board and licence scanner")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Config file (default: ./jae.json if present)")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("board")
                .about("Roster board operations")
                .subcommand_required(true)
                .subcommand(
                    Command::new("init")
                        .about("Create a board from a participants list, everyone unassigned")
                        .arg(
                            Arg::new("participants")
                                .long("participants")
                                .value_name("FILE")
                                .required(true)
                                .value_parser(value_parser!(PathBuf)),
                        )
                        .arg(board_arg())
                        .arg(date_arg()),
                )
                .subcommand(Command::new("show").about("Print the board").arg(board_arg()).arg(date_arg()))
                .subcommand(
                    Command::new("move")
                        .about("Drop a card into a section")
                        .arg(board_arg())
                        .arg(Arg::new("card").long("card").value_name("ID").required(true))
                        .arg(
                            Arg::new("to")
                                .long("to")
                                .value_name("SECTION")
                                .required(true)
                                .value_parser(SECTIONS),
                        )
                        .arg(
                            Arg::new("index")
                                .long("index")
                                .value_name("N")
                                .help("Position in the target section (default: end)")
                                .value_parser(value_parser!(usize)),
                        )
                        .arg(date_arg()),
                )
                .subcommand(
                    Command::new("rename")
                        .about("Set a team heading")
                        .arg(board_arg())
                        .arg(
                            Arg::new("section")
                                .long("section")
                                .required(true)
                                .value_parser(["team1", "team2"]),
                        )
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(date_arg()),
                )
                .subcommand(Command::new("title").about("Print the page title").arg(board_arg()).arg(date_arg()))
                .subcommand(
                    Command::new("export")
                        .about("Write the board under its title-derived filename")
                        .arg(board_arg())
                        .arg(
                            Arg::new("dir")
                                .long("dir")
                                .value_name("DIR")
                                .default_value(".")
                                .value_parser(value_parser!(PathBuf)),
                        )
                        .arg(date_arg()),
                )
                .subcommand(
                    Command::new("import")
                        .about("Replace a board with the contents of an exported file")
                        .arg(
                            Arg::new("file")
                                .value_name("FILE")
                                .required(true)
                                .value_parser(value_parser!(PathBuf)),
                        )
                        .arg(
                            Arg::new("into")
                                .long("into")
                                .value_name("BOARD")
                                .required(true)
                                .value_parser(value_parser!(PathBuf)),
                        )
                        .arg(date_arg()),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Scanner and board settings file")
                .subcommand_required(true)
                .subcommand(
                    Command::new("init")
                        .about("Write a config file with every default filled in")
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .help("Overwrite an existing file")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(Command::new("show").about("Print the effective configuration")),
        )
        .subcommand(
            Command::new("scan")
                .about("Capture a document and send it to the scan endpoint")
                .arg(
                    Arg::new("frames")
                        .long("frames")
                        .value_name("IMAGE")
                        .num_args(1..)
                        .help("Read frames from image files instead of the screen")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("auto")
                        .long("auto")
                        .help("Capture automatically once the frame is sharp")
                        .action(ArgAction::SetTrue),
                )
                .arg(Arg::new("url").long("url").value_name("URL").help("Scan server base URL"))
                .arg(
                    Arg::new("threshold")
                        .long("threshold")
                        .value_name("SCORE")
                        .help("Sharpness threshold for --auto")
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("board")
                        .long("board")
                        .value_name("BOARD")
                        .help("Append extracted licences to this board as unassigned cards")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("once")
                        .long("once")
                        .help("Exit after the first result")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = cli().get_matches();
    let config_path = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
    if let Some(("config", sub)) = matches.subcommand() {
        return run_config(sub, config_path);
    }
    let config = config::load_config(config_path)?;

    match matches.subcommand() {
        Some(("board", sub)) => run_board(sub, &config.board),
        Some(("scan", sub)) => run_scan(sub, config).await,
        _ => unreachable!("subcommand_required is set"),
    }
}

// *************** Board ***************

fn required<'a, T: Clone + Send + Sync + 'static>(m: &'a ArgMatches, name: &str) -> Result<&'a T> {
    m.get_one::<T>(name)
        .with_context(|| format!("missing argument: {}", name))
}

fn match_date(m: &ArgMatches) -> Result<NaiveDate> {
    match m.get_one::<String>("date") {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s)),
        None => Ok(Local::now().date_naive()),
    }
}

fn board_title(board: &Board, config: &BoardConfig, date: NaiveDate) -> String {
    title::synthesize_title(
        date,
        config.locale(),
        config.title_style,
        board.team1_heading(),
        board.team2_heading(),
    )
}

fn run_board(matches: &ArgMatches, config: &BoardConfig) -> Result<()> {
    let (name, m) = matches
        .subcommand()
        .context("missing board subcommand")?;
    let date = match_date(m)?;

    match name {
        "init" => {
            let participants = snapshot::load_participants(required::<PathBuf>(m, "participants")?)?;
            let path = required::<PathBuf>(m, "board")?;
            let board = Board::with_participants(&config.team1_default, &config.team2_default, participants);
            let title = board_title(&board, config, date);
            snapshot::save_board(&board, &title, path)?;
            println!("{} participants -> {}", board.card_count(), path.display());
        }
        "show" => {
            let board = snapshot::load_board(required::<PathBuf>(m, "board")?)?;
            print!("{}", board.render(&board_title(&board, config, date)));
        }
        "title" => {
            let board = snapshot::load_board(required::<PathBuf>(m, "board")?)?;
            println!("{}", board_title(&board, config, date));
        }
        "move" => {
            let path = required::<PathBuf>(m, "board")?;
            let to: Section = required::<String>(m, "to")?.parse()?;
            let event = BoardEvent::CardDropped {
                card_id: required::<String>(m, "card")?.clone(),
                to,
                index: m.get_one::<usize>("index").copied(),
            };
            apply_and_save(path, event, config, date)?;
        }
        "rename" => {
            let path = required::<PathBuf>(m, "board")?;
            let event = BoardEvent::HeadingEdited {
                section: required::<String>(m, "section")?.parse()?,
                text: required::<String>(m, "name")?.clone(),
            };
            apply_and_save(path, event, config, date)?;
        }
        "export" => {
            let board = snapshot::load_board(required::<PathBuf>(m, "board")?)?;
            let title = board_title(&board, config, date);
            let out = snapshot::export_to_dir(&board, &title, required::<PathBuf>(m, "dir")?)?;
            println!("{}", out.display());
        }
        "import" => {
            let file = required::<PathBuf>(m, "file")?;
            let target = required::<PathBuf>(m, "into")?;
            let json = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read import file: {}", file.display()))?;
            let mut board = if target.exists() {
                snapshot::load_board(target)?
            } else {
                Board::new(&config.team1_default, &config.team2_default)
            };
            // Target file is only rewritten once the import parsed.
            snapshot::import_board(&mut board, &json).map_err(|e| anyhow::anyhow!(e.user_message()))?;
            let title = board_title(&board, config, date);
            snapshot::save_board(&board, &title, target)?;
            println!("{}", title);
        }
        other => unreachable!("unknown board subcommand {}", other),
    }
    Ok(())
}

fn apply_and_save(path: &Path, event: BoardEvent, config: &BoardConfig, date: NaiveDate) -> Result<()> {
    let mut board = snapshot::load_board(path)?;
    let change = board.apply(event)?;
    let title = board_title(&board, config, date);
    if let Some(section) = change.heading_changed {
        info!(%section, title = %title, "title recomputed");
    }
    snapshot::save_board(&board, &title, path)?;
    println!("{}", title);
    Ok(())
}

// *************** Scan ***************

async fn run_scan(m: &ArgMatches, mut config: AppConfig) -> Result<()> {
    if let Some(url) = m.get_one::<String>("url") {
        config.scanner.server_url = url.clone();
    }
    if let Some(threshold) = m.get_one::<f64>("threshold") {
        config.scanner.sharpness_threshold = *threshold;
    }
    if m.get_flag("auto") {
        config.scanner.capture_mode = CaptureMode::Auto;
    }

    let uploader = HttpScanUploader::new(
        &config.scanner.server_url,
        &config.scanner.upload_path,
        config.scanner.timeout(),
    )?;
    info!(url = uploader.url(), mode = %config.scanner.capture_mode, "scanner starting");

    let options = ScanOptions {
        board: m.get_one::<PathBuf>("board").cloned(),
        once: m.get_flag("once"),
        board_config: config.board.clone(),
    };

    match m.get_many::<PathBuf>("frames") {
        Some(frames) => {
            let camera = FileCamera { frames: frames.cloned().collect() };
            scan_loop(ScannerController::new(camera, uploader, config.scanner), options).await
        }
        None => {
            let camera = ScreenCamera { region: config.scanner.screen_region };
            scan_loop(ScannerController::new(camera, uploader, config.scanner), options).await
        }
    }
}

struct ScanOptions {
    board: Option<PathBuf>,
    once: bool,
    board_config: BoardConfig,
}

type Scanner<C> = ScannerController<C, HttpScanUploader>;

fn print_status<C: Camera>(controller: &Scanner<C>) {
    if let Some(message) = controller.message() {
        if message.is_error {
            eprintln!("Erreur: {}", message.text);
        } else {
            println!("{}", message.text);
        }
    }
}

/// Question asked before pressing the capture button in its current role.
fn capture_prompt(button: CaptureButton, streaming: bool) -> Option<&'static str> {
    match button {
        CaptureButton::Capture if streaming => Some("Capturer le document ?"),
        CaptureButton::Capture => Some("Réactiver la caméra ?"),
        CaptureButton::Reset => Some("Scanner un autre document ?"),
        CaptureButton::Busy => None,
    }
}

async fn scan_loop<C: Camera>(controller: Scanner<C>, options: ScanOptions) -> Result<()> {
    // The terminal has no viewport of its own; use the configured one.
    let viewport = controller.config().viewport;
    let resized = ScannerInput::Resized { width: viewport.width, height: viewport.height };
    if let ScannerUpdate::Layout(layout) = controller.handle(resized).await {
        if layout.rotate_prompt_visible {
            println!("Veuillez tourner votre appareil en mode paysage.");
            return Ok(());
        }
    }
    print_status(&controller);

    loop {
        let outcome = if controller.state() == ScannerState::Streaming
            && controller.config().capture_mode == CaptureMode::Auto
        {
            println!("Scan automatique : placez le document devant la caméra...");
            auto_capture(&controller).await
        } else {
            let streaming = controller.is_streaming();
            let Some(prompt) = capture_prompt(controller.capture_button(), streaming) else {
                debug!("capture button busy");
                break;
            };
            if !Confirm::new().with_prompt(prompt).default(true).interact()? {
                break;
            }
            if controller.state() == ScannerState::Streaming {
                println!("Scan en cours...");
            }
            match controller.handle(ScannerInput::CaptureRequested).await {
                ScannerUpdate::Capture(outcome) => outcome,
                _ => CaptureOutcome::Ignored,
            }
        };

        match outcome {
            CaptureOutcome::Completed(_) => {
                show_results(&controller, &options)?;
                if options.once {
                    break;
                }
            }
            CaptureOutcome::Failed(e) => {
                debug!("capture failed: {}", e);
                print_status(&controller);
                if options.once {
                    anyhow::bail!("{}", e.user_message());
                }
            }
            CaptureOutcome::Rearmed | CaptureOutcome::Ignored => print_status(&controller),
        }
    }
    Ok(())
}

async fn auto_capture<C: Camera>(controller: &Scanner<C>) -> CaptureOutcome {
    let mut ticker = tokio::time::interval(FRAME_TICK);
    loop {
        ticker.tick().await;
        let ScannerUpdate::Tick(tick) = controller.handle(ScannerInput::FrameTick).await else {
            return CaptureOutcome::Ignored;
        };
        match tick {
            TickOutcome::Blurry { score } => debug!(score, "frame not sharp enough"),
            TickOutcome::Captured { score, outcome } => {
                println!("Document net (score {:.0}).", score);
                return outcome;
            }
            TickOutcome::CameraLost(e) => return CaptureOutcome::Failed(e.into()),
            TickOutcome::Skipped => return CaptureOutcome::Ignored,
        }
    }
}

fn show_results<C: Camera>(controller: &Scanner<C>, options: &ScanOptions) -> Result<()> {
    let Some(outcome) = controller.results() else {
        return Ok(());
    };
    if !controller.layout().results_visible {
        return Ok(());
    }
    println!("{}", results::render_outcome(&outcome));
    if let (Some(path), Some(extracted)) = (&options.board, outcome.extracted()) {
        append_to_board(path, extracted, controller, &options.board_config)?;
    }
    Ok(())
}

fn append_to_board<C: Camera>(
    path: &Path,
    extracted: &results::ScanResult,
    controller: &Scanner<C>,
    config: &BoardConfig,
) -> Result<()> {
    let mut board = if path.exists() {
        snapshot::load_board(path)?
    } else {
        Board::new(&config.team1_default, &config.team2_default)
    };
    let fallback_base = format!("scan-{}", Local::now().format("%Y%m%d%H%M%S"));
    let image_uri = controller.frozen_frame().map(|f| f.data_url());
    let (id, section, existed) = results::add_scanned_card(&mut board, extracted, &fallback_base, image_uri);

    let title = board_title(&board, config, Local::now().date_naive());
    snapshot::save_board(&board, &title, path)?;
    if existed {
        println!("Carte {} mise à jour ({}) dans {}", id, section, path.display());
    } else {
        println!("Carte {} ajoutée à {}", id, path.display());
    }
    Ok(())
}

// *************** Config ***************

fn run_config(matches: &ArgMatches, path: Option<&Path>) -> Result<()> {
    let (name, m) = matches.subcommand().context("missing config subcommand")?;
    let path = path.unwrap_or(Path::new(config::DEFAULT_CONFIG_PATH));
    match name {
        "init" => {
            if path.exists() && !m.get_flag("force") {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config::save_config(&AppConfig::default(), path)?;
            println!("{}", path.display());
        }
        "show" => {
            let config = config::load_config(Some(path).filter(|p| p.exists()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        other => unreachable!("unknown config subcommand {}", other),
    }
    Ok(())
}
