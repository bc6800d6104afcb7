use lazyblock::activate::{
    ActivationController, ActivationError, ControllerOptions, Dispatch, HeadlessHost,
    LifecycleEvent,
};
use lazyblock::{
    Author, BlockConfiguration, BlockReason, Check, EncodedInstance, IdSource, PayloadError,
    Rendered, Renderer, Settings, Verdict, payload,
};
use serde::Serialize;
use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Core(lazyblock::Error),
    Payload(PayloadError),
    Activation(ActivationError),
    Json(serde_json::Error),
    NotActivated(String),
    Blocked,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Core(err) => write!(f, "{err}"),
            CliError::Payload(err) => write!(f, "Malformed payload: {err}"),
            CliError::Activation(err) => write!(f, "{err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
            CliError::NotActivated(id) => {
                write!(f, "Instance {id} is unknown or was already activated")
            }
            CliError::Blocked => write!(f, "Block content was refused"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<lazyblock::Error> for CliError {
    fn from(value: lazyblock::Error) -> Self {
        Self::Core(value)
    }
}

impl From<PayloadError> for CliError {
    fn from(value: PayloadError) -> Self {
        Self::Payload(value)
    }
}

impl From<ActivationError> for CliError {
    fn from(value: ActivationError) -> Self {
        Self::Activation(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Command {
    #[default]
    Render,
    Scan,
    Sanitize,
    Encode,
    Decode,
    Activate,
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    privileged: bool,
    settings: Option<String>,
    id: Option<String>,
    pretty: bool,
    markup_only: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderOut<'a> {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance: Option<&'a EncodedInstance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a BlockReason>,
    warnings: &'a [Check],
    markup: &'a str,
}

#[derive(Serialize)]
struct ScanOut<'a> {
    verdict: Verdict,
    warnings: &'a [Check],
    reasons: Vec<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceOut<'a> {
    id: &'a str,
    state: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventOut {
    name: &'static str,
    instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl From<&LifecycleEvent> for EventOut {
    fn from(event: &LifecycleEvent) -> Self {
        let detail = match event {
            LifecycleEvent::Loaded { .. } => None,
            LifecycleEvent::SecurityRejected { reason, .. } => Some(reason.clone()),
            LifecycleEvent::Failed { error, .. } => Some(error.to_string()),
        };
        Self {
            name: event.name(),
            instance_id: event.instance_id().to_string(),
            detail,
        }
    }
}

#[derive(Serialize)]
struct ActivateOut<'a> {
    instances: Vec<InstanceOut<'a>>,
    events: Vec<EventOut>,
}

fn usage() -> &'static str {
    "lazyblock\n\
\n\
USAGE:\n\
  lazyblock [render] [--privileged] [--settings <path>] [--id <id>] [--markup] [--pretty] [<path>|-]\n\
  lazyblock scan [--privileged] [--pretty] [<path>|-]\n\
  lazyblock sanitize [--privileged] [<path>|-]\n\
  lazyblock encode [--privileged] [<path>|-]\n\
  lazyblock decode [<path>|-]\n\
  lazyblock activate [--settings <path>] [--id <id>] [--pretty] [<path>|-]\n\
\n\
NOTES:\n\
  - If <path> is omitted or '-', input is read from stdin.\n\
  - render reads a block configuration (JSON) and prints the outcome as JSON; --markup prints\n\
    only the page markup. A refused block exits with status 3.\n\
  - scan, sanitize and encode read raw HTML; --privileged acts as an author who may publish\n\
    scripts.\n\
  - decode reads a base64 payload and rejects anything outside the strict alphabet.\n\
  - activate reads rendered page markup, loads the instance named by --id (or every pending\n\
    instance) and prints the final state of each instance with the lifecycle events.\n\
  - --settings accepts a .json, .yaml or .yml file.\n\
  - Set RUST_LOG (e.g. RUST_LOG=debug) for pipeline logs on stderr.\n\
"
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "render" => args.command = Command::Render,
            "scan" => args.command = Command::Scan,
            "sanitize" => args.command = Command::Sanitize,
            "encode" => args.command = Command::Encode,
            "decode" => args.command = Command::Decode,
            "activate" => args.command = Command::Activate,
            "--privileged" => args.privileged = true,
            "--pretty" => args.pretty = true,
            "--markup" => args.markup_only = true,
            "--settings" => {
                let Some(path) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.settings = Some(path.clone());
            }
            "--id" => {
                let Some(id) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                if id.trim().is_empty() {
                    return Err(CliError::Usage(usage()));
                }
                args.id = Some(id.trim().to_string());
            }
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            other if other.starts_with('-') && other != "-" => {
                return Err(CliError::Usage(usage()));
            }
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    Ok(args)
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn write_json(value: &impl Serialize, pretty: bool) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(std::io::stdout().lock(), value)?;
    } else {
        serde_json::to_writer(std::io::stdout().lock(), value)?;
    }
    println!();
    Ok(())
}

fn load_settings(path: Option<&str>) -> Result<Settings, CliError> {
    match path {
        Some(path) => Ok(Settings::load(path)?),
        None => Ok(Settings::default()),
    }
}

fn author(privileged: bool) -> Author {
    if privileged {
        Author::administrator()
    } else {
        Author::contributor()
    }
}

fn render(args: &Args, text: &str) -> Result<(), CliError> {
    let settings = load_settings(args.settings.as_deref())?;
    let block = BlockConfiguration::from_json_str(text)?;
    let mut renderer = Renderer::new(settings);
    if let Some(id) = &args.id {
        renderer = renderer.with_id_source(IdSource::Fixed(id.clone()));
    }
    let rendered = renderer.render(&block, &author(args.privileged))?;

    if args.markup_only {
        println!("{}", rendered.markup());
    } else {
        let out = match &rendered {
            Rendered::Empty => RenderOut {
                outcome: "empty",
                instance: None,
                reason: None,
                warnings: &[],
                markup: rendered.markup(),
            },
            Rendered::Blocked(reason) => RenderOut {
                outcome: "blocked",
                instance: None,
                reason: Some(reason),
                warnings: match reason {
                    BlockReason::UnsafeContent { report } => report.warnings.as_slice(),
                    BlockReason::Oversize { .. } => &[],
                },
                markup: rendered.markup(),
            },
            Rendered::Instance {
                instance,
                markup,
                warnings,
            } => RenderOut {
                outcome: "instance",
                instance: Some(instance),
                reason: None,
                warnings,
                markup,
            },
        };
        write_json(&out, args.pretty)?;
    }

    if rendered.is_blocked() {
        return Err(CliError::Blocked);
    }
    Ok(())
}

fn activate(args: &Args, text: &str) -> Result<(), CliError> {
    let settings = load_settings(args.settings.as_deref())?;
    let mut controller = ActivationController::from_markup(text, HeadlessHost::default())?
        .with_options(ControllerOptions::from_settings(&settings));

    let events = Rc::new(RefCell::new(Vec::<EventOut>::new()));
    let sink = Rc::clone(&events);
    controller.subscribe(move |event| sink.borrow_mut().push(EventOut::from(event)));

    match &args.id {
        Some(id) => {
            if controller.load(id) == Dispatch::Ignored {
                return Err(CliError::NotActivated(id.clone()));
            }
        }
        None => {
            let started = controller.load_all();
            tracing::debug!(started, "loading every pending instance");
        }
    }
    controller.run_until_idle();

    let out = ActivateOut {
        instances: controller
            .page()
            .instances()
            .map(|node| InstanceOut {
                id: node.id(),
                state: node.state().as_str(),
                content: node.content(),
            })
            .collect(),
        events: events.take(),
    };
    write_json(&out, args.pretty)
}

fn run(args: Args) -> Result<(), CliError> {
    let text = read_input(args.input.as_deref())?;

    match args.command {
        Command::Render => render(&args, &text),
        Command::Scan => {
            let report = lazyblock::scan(&text);
            let out = ScanOut {
                verdict: report.verdict(args.privileged),
                warnings: &report.warnings,
                reasons: report.reasons(),
            };
            write_json(&out, args.pretty)
        }
        Command::Sanitize => {
            let sanitized = lazyblock::sanitize(&text, args.privileged).with_hardened_iframes();
            println!("{}", sanitized.as_str());
            Ok(())
        }
        Command::Encode => {
            let sanitized = lazyblock::sanitize(&text, args.privileged).with_hardened_iframes();
            println!("{}", payload::encode(&sanitized));
            Ok(())
        }
        Command::Decode => {
            let html = payload::decode(text.trim())?;
            println!("{html}");
            Ok(())
        }
        Command::Activate => activate(&args, &text),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    match run(args) {
        Ok(()) => {}
        Err(CliError::Blocked) => {
            eprintln!("{}", CliError::Blocked);
            std::process::exit(3);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
