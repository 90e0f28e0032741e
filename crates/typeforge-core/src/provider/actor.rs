//! # Provider Actor
//!
//! Native debugging engines usually insist that every call comes from the
//! thread that opened the session. The actor gives a provider exactly that:
//! it is constructed on a dedicated worker thread, lives there until shutdown,
//! and all queries reach it as messages over a channel.
//!
//! ```rust
//! use typeforge_core::provider::{InMemoryProvider, ProviderActor, SymbolProvider};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let actor = ProviderActor::spawn(|| Ok(InMemoryProvider::new().with_module("app")))?;
//! let mut handle = actor.handle();
//! assert_eq!(handle.modules()?, vec!["app".to_string()]);
//! actor.shutdown();
//! # Ok(())
//! # }
//! ```

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::{ShapeDescriptor, SymbolProvider};
use crate::error::ProviderError;
use crate::model::TypeQuery;

type Reply<T> = Sender<Result<T, ProviderError>>;

enum Request
{
    Modules(Reply<Vec<String>>),
    TypeNames
    {
        module: String,
        reply: Reply<Vec<String>>,
    },
    Lookup
    {
        module: String,
        query: TypeQuery,
        reply: Reply<Option<ShapeDescriptor>>,
    },
    Shutdown,
}

/// Worker thread that exclusively owns a [`SymbolProvider`].
///
/// Dropping the actor shuts the worker down and joins it. Handles that are
/// still alive afterwards fail every query with
/// [`ProviderError::Disconnected`].
pub struct ProviderActor
{
    handle: ProviderHandle,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ProviderActor
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ProviderActor")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl ProviderActor
{
    /// Start the worker and build the provider on it.
    ///
    /// `factory` runs on the worker thread, so the provider itself never has
    /// to be `Send`.
    ///
    /// ## Errors
    ///
    /// Returns the factory's error, or `Native` if the thread cannot be
    /// spawned.
    pub fn spawn<F, P>(factory: F) -> Result<Self, ProviderError>
    where
        F: FnOnce() -> Result<P, ProviderError> + Send + 'static,
        P: SymbolProvider + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Request>();
        let (ready_sender, ready_receiver) = mpsc::channel::<Result<(), ProviderError>>();

        let thread = thread::Builder::new()
            .name("typeforge-provider".to_string())
            .spawn(move || {
                let mut provider = match factory() {
                    Ok(provider) => {
                        let _ = ready_sender.send(Ok(()));
                        provider
                    }
                    Err(err) => {
                        let _ = ready_sender.send(Err(err));
                        return;
                    }
                };
                serve(&mut provider, &receiver);
            })
            .map_err(|err| ProviderError::Native(format!("failed to spawn provider thread: {err}")))?;

        match ready_receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(ProviderError::Disconnected);
            }
        }

        debug!("Provider actor started");
        Ok(Self {
            handle: ProviderHandle { sender },
            thread: Some(thread),
        })
    }

    /// A new handle for submitting queries.
    #[must_use]
    pub fn handle(&self) -> ProviderHandle
    {
        self.handle.clone()
    }

    /// Stop the worker once it has answered every query already queued.
    pub fn shutdown(mut self)
    {
        self.stop();
    }

    fn stop(&mut self)
    {
        if let Some(thread) = self.thread.take() {
            let _ = self.handle.sender.send(Request::Shutdown);
            if thread.join().is_err() {
                warn!("Provider actor panicked");
            }
            debug!("Provider actor stopped");
        }
    }
}

impl Drop for ProviderActor
{
    fn drop(&mut self)
    {
        self.stop();
    }
}

fn serve<P: SymbolProvider>(provider: &mut P, receiver: &Receiver<Request>)
{
    while let Ok(request) = receiver.recv() {
        match request {
            Request::Modules(reply) => {
                let _ = reply.send(provider.modules());
            }
            Request::TypeNames { module, reply } => {
                let _ = reply.send(provider.type_names(&module));
            }
            Request::Lookup { module, query, reply } => {
                let _ = reply.send(provider.lookup_type(&module, &query));
            }
            Request::Shutdown => break,
        }
    }
}

/// Cloneable request channel to a [`ProviderActor`].
///
/// Implements [`SymbolProvider`] by sending each call to the worker and
/// blocking until it answers. Safe to hand to several module workers at
/// once; their queries are served one at a time.
#[derive(Clone)]
pub struct ProviderHandle
{
    sender: Sender<Request>,
}

impl std::fmt::Debug for ProviderHandle
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ProviderHandle").finish_non_exhaustive()
    }
}

impl ProviderHandle
{
    fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Request) -> Result<T, ProviderError>
    {
        let (reply, response) = mpsc::channel();
        self.sender.send(build(reply)).map_err(|_| ProviderError::Disconnected)?;
        response.recv().map_err(|_| ProviderError::Disconnected)?
    }
}

impl SymbolProvider for ProviderHandle
{
    fn modules(&mut self) -> Result<Vec<String>, ProviderError>
    {
        self.call(Request::Modules)
    }

    fn type_names(&mut self, module: &str) -> Result<Vec<String>, ProviderError>
    {
        self.call(|reply| Request::TypeNames {
            module: module.to_string(),
            reply,
        })
    }

    fn lookup_type(&mut self, module: &str, query: &TypeQuery) -> Result<Option<ShapeDescriptor>, ProviderError>
    {
        self.call(|reply| Request::Lookup {
            module: module.to_string(),
            query: query.clone(),
            reply,
        })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::provider::InMemoryProvider;

    #[test]
    fn test_round_trip_through_worker()
    {
        let actor = ProviderActor::spawn(|| Ok(InMemoryProvider::new().with_struct("app", "Node", 8, Vec::new()))).unwrap();
        let mut handle = actor.handle();
        assert_eq!(handle.type_names("app").unwrap(), vec!["Node"]);
        assert!(handle.lookup_type("app", &TypeQuery::name("Node")).unwrap().is_some());
        assert!(handle.lookup_type("app", &TypeQuery::name("Other")).unwrap().is_none());
        actor.shutdown();
    }

    #[test]
    fn test_handle_after_shutdown_is_disconnected()
    {
        let actor = ProviderActor::spawn(|| Ok(InMemoryProvider::new())).unwrap();
        let mut handle = actor.handle();
        actor.shutdown();
        assert_eq!(handle.modules(), Err(ProviderError::Disconnected));
    }

    #[test]
    fn test_factory_error_is_returned()
    {
        let result = ProviderActor::spawn(|| -> Result<InMemoryProvider, ProviderError> {
            Err(ProviderError::Native("no session".into()))
        });
        assert_eq!(result.unwrap_err(), ProviderError::Native("no session".into()));
    }

    #[test]
    fn test_provider_runs_on_worker_thread()
    {
        struct ThreadCheck
        {
            owner: thread::ThreadId,
        }

        impl SymbolProvider for ThreadCheck
        {
            fn modules(&mut self) -> Result<Vec<String>, ProviderError>
            {
                if thread::current().id() == self.owner {
                    Ok(vec!["ok".to_string()])
                } else {
                    Err(ProviderError::Native("wrong thread".into()))
                }
            }

            fn type_names(&mut self, _module: &str) -> Result<Vec<String>, ProviderError>
            {
                Ok(Vec::new())
            }

            fn lookup_type(&mut self, _module: &str, _query: &TypeQuery) -> Result<Option<ShapeDescriptor>, ProviderError>
            {
                Ok(None)
            }
        }

        let actor = ProviderActor::spawn(|| {
            Ok(ThreadCheck {
                owner: thread::current().id(),
            })
        })
        .unwrap();
        let mut handle = actor.handle();
        let worker = thread::spawn(move || handle.modules());
        assert_eq!(worker.join().unwrap().unwrap(), vec!["ok".to_string()]);
    }
}
