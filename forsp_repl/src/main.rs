use std::{
    collections::VecDeque,
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, IsTerminal, Read, Stdout, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use clap::Parser;
use forsp::{BusConfig, Console, Layout, Runtime, RuntimeConfig};
use rustyline::{error::ReadlineError, DefaultEditor};
use tracing::debug;
use yansi::Paint;

/// Run forsp programs. Source files are read first, then standard input.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Programs to run before standard input.
    files: Vec<PathBuf>,
    /// Total arena size in 8-byte words.
    #[arg(long, default_value_t = Layout::default().memory_words)]
    memory_words: usize,
    /// Lists nested deeper than this print as `...`.
    #[arg(long, default_value_t = RuntimeConfig::default().print_depth)]
    print_depth: usize,
    /// Size of the sandboxed memory behind load and store.
    #[arg(long, default_value_t = 0x1000, conflicts_with = "raw_memory")]
    sandbox_bytes: usize,
    /// Let load and store touch real process memory.
    #[arg(long)]
    raw_memory: bool,
}

enum Input {
    Stream(Box<dyn BufRead>),
    /// Line editing on a terminal. The prompt stays empty.
    Lines {
        editor: DefaultEditor,
        line: VecDeque<u8>,
    },
}

struct HostConsole {
    input: Input,
    output: BufWriter<Stdout>,
}

impl Console for HostConsole {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        match &mut self.input {
            Input::Stream(reader) => {
                let mut byte = 0;
                loop {
                    match reader.read(std::slice::from_mut(&mut byte)) {
                        Ok(0) => return Ok(None),
                        Ok(_) => return Ok(Some(byte)),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e),
                    }
                }
            }
            Input::Lines { editor, line } => {
                while line.is_empty() {
                    // whatever was printed so far belongs above the next line
                    self.output.flush()?;
                    match editor.readline("") {
                        Ok(text) => {
                            _ = editor.add_history_entry(text.as_str());
                            line.extend(text.into_bytes());
                            line.push_back(b'\n');
                        }
                        Err(ReadlineError::Eof | ReadlineError::Interrupted) => return Ok(None),
                        Err(ReadlineError::Io(e)) => return Err(e),
                        Err(e) => return Err(io::Error::other(e)),
                    }
                }
                Ok(line.pop_front())
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.write_all(&[byte])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.write_all(bytes)
    }

    fn report_error(&mut self, message: &[u8]) -> io::Result<()> {
        self.output.flush()?;
        let message = String::from_utf8_lossy(message);
        let mut errors = io::stderr().lock();
        write!(errors, "{}", message.red())?;
        errors.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

fn open_input(files: &[PathBuf]) -> anyhow::Result<Input> {
    if files.is_empty() && io::stdin().is_terminal() {
        return Ok(Input::Lines {
            editor: DefaultEditor::new()?,
            line: VecDeque::new(),
        });
    }

    let mut input: Box<dyn Read> = Box::new(io::empty());
    for path in files {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        input = Box::new(input.chain(file));
    }
    let input = input.chain(io::stdin());
    Ok(Input::Stream(Box::new(BufReader::new(input))))
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::WARN.into())
                .from_env_lossy(),
        )
        .init();
    yansi::whenever(yansi::Condition::STDERR_IS_TTY);

    let args = Args::parse();
    let config = RuntimeConfig {
        layout: Layout {
            memory_words: args.memory_words,
        },
        print_depth: args.print_depth,
        bus: if args.raw_memory {
            BusConfig::Raw
        } else {
            BusConfig::Sandbox {
                bytes: args.sandbox_bytes,
            }
        },
    };
    debug!(?config, "starting");

    let console = HostConsole {
        input: open_input(&args.files)?,
        output: BufWriter::new(io::stdout()),
    };
    let mut runtime = if args.raw_memory {
        // SAFETY: --raw-memory is the user's statement that the program is
        // trusted with this process's address space.
        unsafe { Runtime::new_raw(config, console) }
    } else {
        Runtime::new(config, console)
    }
    .context("not enough memory to start the runtime")?;

    let outcome = runtime.run();
    debug!(stats = ?runtime.stats(), "finished");
    Ok(match outcome {
        Ok(()) => ExitCode::SUCCESS,
        // already reported through the console
        Err(_) => ExitCode::FAILURE,
    })
}
