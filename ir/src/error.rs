use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure to observe a usable signature for the target function.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TraceError {
    /// Another trace session is installed on this process.
    #[snafu(display("a trace session is already active"))]
    SessionActive,

    #[snafu(display("'{type_name}' object cannot be traced: not a user function"))]
    NotCallable { type_name: String },

    /// The representative call itself failed on the host.
    #[snafu(display("traced call of '{function}' failed: {source}"))]
    Call { function: String, source: gpumap_host::Error },

    #[snafu(display("'{function}' returns '{type_name}', which has no device representation"))]
    UntranslatableReturn { function: String, type_name: String },

    #[snafu(display("no call of '{function}' was observed"))]
    NotObserved { function: String },
}

/// A value whose type falls outside the primitive/class universe.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LayoutError {
    #[snafu(display("field '{class}.{field}' has unsupported type '{type_name}'"))]
    UnsupportedField { class: String, field: String, type_name: String },

    #[snafu(display("parameter '{param}' of '{function}' has unsupported type '{type_name}'"))]
    UnsupportedArgument { function: String, param: String, type_name: String },

    #[snafu(display("value of type '{type_name}' has no device layout"))]
    UnsupportedValue { type_name: String },

    /// Element type of an empty list cannot be observed.
    #[snafu(display("cannot infer the element type of an empty list ({context})"))]
    EmptyCollection { context: String },

    /// A class containing itself by value has no finite layout.
    #[snafu(display("class '{name}' contains itself"))]
    RecursiveClass { name: String },

    #[snafu(display("instance of '{name}' is missing field '{field}' of its class layout"))]
    MissingField { name: String, field: String },
}

/// Any failure while building the registry from a trace.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{source}"))]
    Trace { source: TraceError },

    #[snafu(display("{source}"))]
    Layout { source: LayoutError },

    #[snafu(display("function '{function}' is not in the registry"))]
    UnknownFunction { function: String },
}
