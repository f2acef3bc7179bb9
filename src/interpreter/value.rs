//! Runtime values, evaluation outcomes and continuations

use std::fmt;
use std::rc::Rc;

use crate::runtime::client::ClientStub;
use crate::runtime::error::Result;
use crate::runtime::request::{Failure, Status};
use crate::runtime::scheduler::Scheduler;
use crate::runtime::service::{Operation, Service, ServiceLike};

/// Runtime value bound in an environment.
#[derive(Clone)]
pub enum Value {
    /// No meaningful value (result of calls and think steps).
    Unit,
    /// Plain number binding.
    Number(f64),
    /// Service defined by a `DefineService` node.
    Service(Rc<Service>),
    /// Host-provided request target.
    Endpoint(Rc<dyn ServiceLike>),
    /// Operation defined by a `DefineOperation` node.
    Operation(Rc<Operation>),
    /// Client stub defined by a `DefineClientStub` node.
    Client(Rc<ClientStub>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("Unit"),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Service(service) => write!(f, "Service({})", service.name()),
            Value::Endpoint(endpoint) => write!(f, "Endpoint({})", endpoint.name()),
            Value::Operation(op) => write!(f, "Operation({}.{})", op.service(), op.name()),
            Value::Client(client) => write!(f, "Client({})", client.name()),
        }
    }
}

impl Value {
    /// Wrap a host implementation as a bindable request target.
    pub fn endpoint<S: ServiceLike + 'static>(service: Rc<S>) -> Self {
        Value::Endpoint(service as Rc<dyn ServiceLike>)
    }

    /// Anything that can receive requests.
    pub fn as_service_like(&self) -> Option<Rc<dyn ServiceLike>> {
        match self {
            Value::Service(service) => Some(Rc::clone(service) as Rc<dyn ServiceLike>),
            Value::Endpoint(endpoint) => Some(Rc::clone(endpoint)),
            _ => None,
        }
    }

    /// DSL-defined service, if this is one.
    pub fn as_service(&self) -> Option<&Rc<Service>> {
        match self {
            Value::Service(service) => Some(service),
            _ => None,
        }
    }

    /// Client stub, if this is one.
    pub fn as_client(&self) -> Option<&Rc<ClientStub>> {
        match self {
            Value::Client(client) => Some(client),
            _ => None,
        }
    }
}

/// Result of evaluating a node: a value, or a simulated failure.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The node completed normally.
    Success(Value),
    /// The node resolved to ERROR.
    Error(Failure),
}

impl Outcome {
    /// Whether the outcome is SUCCESS.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Terminal status corresponding to the outcome.
    pub fn status(&self) -> Status {
        match self {
            Outcome::Success(_) => Status::Success,
            Outcome::Error(_) => Status::Error,
        }
    }
}

/// Where evaluation resumes once a node has an outcome.
pub type Continuation = Box<dyn FnOnce(&mut Scheduler, Outcome) -> Result<()>>;
