use std::error::Error;
use std::fmt;

pub type GangplankResult<T> = Result<T, GangplankError>;

/// wrap any result into a GangplankError and add the given msg
#[macro_export]
macro_rules! wrap {
    ($result:expr, $msg:expr) => {
        $result.map_err(|err| GangplankError::wrap($msg, err.into()))
    };
}

pub trait ErrorWrap<T> {
    /// wrap GangplankResult error into a GangplankError and add the given msg
    fn wrap<S>(self, msg: S) -> GangplankResult<T>
    where
        S: Into<String>;
}

impl<T> ErrorWrap<T> for GangplankResult<T> {
    fn wrap<S>(self, msg: S) -> GangplankResult<T>
    where
        S: Into<String>,
    {
        self.map_err(|err| GangplankError::wrap(msg, err))
    }
}

// The main gangplank error type. Request handlers surface these verbatim to
// the container runtime.
#[derive(Debug)]
pub enum GangplankError {
    // A string message
    Message(String),
    // A chain of multiple errors
    Chain(String, Box<GangplankError>),

    // Missing or malformed options from the container runtime
    BadRequest(String),
    // Orchestrator object, host network or host endpoint absent
    NotFound(String),
    // A host network with the encoded name already exists
    AlreadyExists(String),
    // The host network still has active endpoints
    InUse(String),
    // Several candidates and nothing to disambiguate them
    Ambiguous(String),
    NoGateway,
    NoMac,
    // A required orchestrator field is empty
    Empty(String),
    // Pre-call configuration problems, e.g. an empty auth URL
    Config(String),
    Timeout(String),
    // Malformed UTF-16 buffer from the host shell
    Encoding(String),
    // Non-zero exit from a child process with captured outputs
    Subprocess { stdout: String, stderr: String },
    NotImplemented(String),
    AlreadyServing,
    ExtensionStopped(String),
    NotEnabled(String),
    // Orchestrator delete refused because children still reference the object
    Conflict(String),
    // A child reference from a conflict response could not be resolved
    ChildLookup(String),

    Io(std::io::Error),
    Serde(serde_json::Error),
    Http(reqwest::Error),
    Runtime(bollard::errors::Error),
}

impl GangplankError {
    pub fn msg<S>(msg: S) -> GangplankError
    where
        S: Into<String>,
    {
        GangplankError::Message(msg.into())
    }

    pub fn wrap<S>(msg: S, chained: GangplankError) -> GangplankError
    where
        S: Into<String>,
    {
        GangplankError::Chain(msg.into(), Box::new(chained))
    }

    // Get the exit code that the supervisor should exit with
    pub fn get_exit_code(&self) -> i32 {
        1
    }

    // Print the error in a standardized JSON format
    pub fn print_json(&self) {
        let to_json = JsonError {
            error: self.to_string(),
        };
        println!(
            "{}",
            serde_json::to_string(&to_json).unwrap_or(format!(
                "Failed to serialize error message: {}",
                to_json.error
            ))
        );
    }

    /// unwrap the chain error recursively until we reach a non chain error
    pub fn unwrap(&self) -> &GangplankError {
        match self {
            GangplankError::Chain(_, inner) => inner.unwrap(),
            _ => self,
        }
    }
}

// Internal struct for JSON output
#[derive(Debug, Serialize, Deserialize)]
struct JsonError {
    pub error: String,
}

impl fmt::Display for GangplankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GangplankError::Message(s) => write!(f, "{}", s),
            GangplankError::Chain(s, e) => write!(f, "{}: {}", s, e),
            GangplankError::BadRequest(s) => write!(f, "bad request: {}", s),
            GangplankError::NotFound(s) => write!(f, "not found: {}", s),
            GangplankError::AlreadyExists(s) => write!(f, "already exists: {}", s),
            GangplankError::InUse(s) => write!(f, "in use: {}", s),
            GangplankError::Ambiguous(s) => write!(f, "ambiguous: {}", s),
            GangplankError::NoGateway => write!(f, "default gateway is empty"),
            GangplankError::NoMac => write!(f, "interface MAC list is empty"),
            GangplankError::Empty(s) => write!(f, "{} is empty", s),
            GangplankError::Config(s) => write!(f, "configuration error: {}", s),
            GangplankError::Timeout(s) => write!(f, "timed out: {}", s),
            GangplankError::Encoding(s) => write!(f, "encoding error: {}", s),
            GangplankError::Subprocess { stdout, stderr } => {
                write!(f, "subprocess failed: stdout: {}; stderr: {}", stdout, stderr)
            }
            GangplankError::NotImplemented(s) => write!(f, "{} is not implemented", s),
            GangplankError::AlreadyServing => write!(f, "already serving"),
            GangplankError::ExtensionStopped(s) => {
                write!(f, "forwarding extension is not running: {}", s)
            }
            GangplankError::NotEnabled(s) => {
                write!(f, "forwarding extension is not enabled on switch {}", s)
            }
            GangplankError::Conflict(s) => write!(f, "{}", s),
            GangplankError::ChildLookup(s) => write!(f, "failed to look up child object {}", s),
            GangplankError::Io(e) => write!(f, "IO error: {}", e),
            GangplankError::Serde(e) => write!(f, "JSON decoding error: {}", e),
            GangplankError::Http(e) => write!(f, "HTTP error: {}", e),
            GangplankError::Runtime(e) => write!(f, "container runtime error: {}", e),
        }
    }
}

impl Error for GangplankError {}

impl From<std::io::Error> for GangplankError {
    fn from(err: std::io::Error) -> GangplankError {
        GangplankError::Io(err)
    }
}

impl From<serde_json::Error> for GangplankError {
    fn from(err: serde_json::Error) -> GangplankError {
        GangplankError::Serde(err)
    }
}

impl From<reqwest::Error> for GangplankError {
    fn from(err: reqwest::Error) -> GangplankError {
        GangplankError::Http(err)
    }
}

impl From<bollard::errors::Error> for GangplankError {
    fn from(err: bollard::errors::Error) -> GangplankError {
        GangplankError::Runtime(err)
    }
}

impl From<ipnet::AddrParseError> for GangplankError {
    fn from(e: ipnet::AddrParseError) -> Self {
        GangplankError::Message(format!("{}", e))
    }
}
