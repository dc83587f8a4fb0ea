// Dependency injection container

use crate::Error;
use gantry_log::{debug, trace};
use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A type the container can build on demand.
///
/// `construct` plays the role of the declared constructor parameter list:
/// every dependency is pulled out of the container, in declaration order,
/// and the container recurses into each dependency's own `construct` as
/// needed.
///
/// ```rust
/// use gantry_core::{Container, Error, Injectable};
/// use std::sync::Arc;
///
/// struct Database;
/// impl Injectable for Database {
///     fn construct(_: &Container) -> Result<Self, Error> {
///         Ok(Database)
///     }
/// }
///
/// struct PostRepository {
///     db: Arc<Database>,
/// }
/// impl Injectable for PostRepository {
///     fn construct(container: &Container) -> Result<Self, Error> {
///         Ok(Self { db: container.get()? })
///     }
/// }
/// ```
pub trait Injectable: Send + Sync + 'static {
    fn construct(container: &Container) -> Result<Self, Error>
    where
        Self: Sized;
}

type AnyArc = Arc<dyn Any + Send + Sync>;
type FactoryFn = Arc<dyn Fn(&Container) -> Result<AnyArc, Error> + Send + Sync>;

enum Binding {
    /// A pre-built object; handed out as-is on every lookup.
    Instance(AnyArc),
    /// A deferred constructor; `shared` caches the first build.
    Factory { build: FactoryFn, shared: bool },
}

impl Clone for Binding {
    fn clone(&self) -> Self {
        match self {
            Binding::Instance(any) => Binding::Instance(any.clone()),
            Binding::Factory { build, shared } => Binding::Factory {
                build: build.clone(),
                shared: *shared,
            },
        }
    }
}

thread_local! {
    /// In-flight resolution stack. Resolution is synchronous, so the chain
    /// of nested `construct` calls lives entirely on one thread; re-entering
    /// a type already on the stack is a dependency cycle.
    static RESOLVING: RefCell<Vec<(TypeId, &'static str)>> = const { RefCell::new(Vec::new()) };
}

/// Pops its type off the in-flight stack when the resolution frame ends,
/// error paths included.
struct ResolveGuard(TypeId);

impl ResolveGuard {
    fn enter(id: TypeId, name: &'static str) -> Result<Self, Error> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(t, _)| *t == id) {
                let mut chain: Vec<&str> = stack.iter().map(|(_, n)| *n).collect();
                chain.push(name);
                return Err(Error::ResolutionCycle(chain.join(" -> ")));
            }
            stack.push((id, name));
            Ok(())
        })?;
        Ok(Self(id))
    }
}

impl Drop for ResolveGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|(t, _)| *t == self.0) {
                stack.remove(pos);
            }
        });
    }
}

/// The dependency injection container.
///
/// Bindings are keyed by `TypeId` and registered at boot; re-registering an
/// identifier is rejected rather than silently overwriting. During request
/// handling the container is read-only apart from the shared-instance cache,
/// which fills on first resolution of a shared binding.
#[derive(Clone, Default)]
pub struct Container {
    bindings: Arc<RwLock<HashMap<TypeId, Binding>>>,
    shared: Arc<RwLock<HashMap<TypeId, AnyArc>>>,
}

impl Container {
    pub fn new() -> Self {
        debug!(target: "gantry::container", "Creating new DI container");
        Self::default()
    }

    fn insert_binding(&self, id: TypeId, name: &'static str, binding: Binding) -> Result<(), Error> {
        let mut bindings = self.bindings.write().unwrap();
        if bindings.contains_key(&id) {
            return Err(Error::DuplicateBinding(name.to_string()));
        }
        bindings.insert(id, binding);
        debug!(target: "gantry::container", "Registered binding: {}", name);
        Ok(())
    }

    /// Register a constructible type; a fresh instance is built per lookup.
    pub fn register<T: Injectable>(&self) -> Result<(), Error> {
        self.insert_binding(
            TypeId::of::<T>(),
            type_name::<T>(),
            Binding::Factory {
                build: Arc::new(|c| T::construct(c).map(|v| Arc::new(v) as AnyArc)),
                shared: false,
            },
        )
    }

    /// Register a constructible type whose first instance is cached and
    /// handed out on every subsequent lookup.
    pub fn register_shared<T: Injectable>(&self) -> Result<(), Error> {
        self.insert_binding(
            TypeId::of::<T>(),
            type_name::<T>(),
            Binding::Factory {
                build: Arc::new(|c| T::construct(c).map(|v| Arc::new(v) as AnyArc)),
                shared: true,
            },
        )
    }

    /// Register a pre-built instance. Also the only way to satisfy scalar
    /// constructor arguments (connection strings, flags, trait objects) —
    /// the container never autowires those.
    pub fn register_instance<T: Send + Sync + 'static>(&self, instance: T) -> Result<(), Error> {
        self.insert_binding(
            TypeId::of::<T>(),
            type_name::<T>(),
            Binding::Instance(Arc::new(instance)),
        )
    }

    /// Register a factory closure for `T`.
    pub fn register_factory<T, F>(&self, shared: bool, factory: F) -> Result<(), Error>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.insert_binding(
            TypeId::of::<T>(),
            type_name::<T>(),
            Binding::Factory {
                build: Arc::new(move |c| factory(c).map(|v| Arc::new(v) as AnyArc)),
                shared,
            },
        )
    }

    /// Check if a binding exists for `T`.
    pub fn has<T: 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.bindings.read().unwrap().contains_key(&id)
            || self.shared.read().unwrap().contains_key(&id)
    }

    /// Resolve a constructible type, autowiring it if unbound.
    ///
    /// Resolution order: shared-instance cache, explicit binding, implicit
    /// self-binding through `T::construct`. Implicit resolutions are
    /// transient — nothing is cached or added to the binding table.
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>, Error> {
        let id = TypeId::of::<T>();

        if let Some(cached) = self.shared.read().unwrap().get(&id) {
            trace!(target: "gantry::container", "Shared cache hit: {}", type_name::<T>());
            return downcast::<T>(cached.clone());
        }

        let binding = self.bindings.read().unwrap().get(&id).cloned();
        match binding {
            Some(binding) => self.build_bound::<T>(id, binding),
            None => {
                trace!(
                    target: "gantry::container",
                    "Autowiring unbound type: {}",
                    type_name::<T>()
                );
                let guard = ResolveGuard::enter(id, type_name::<T>())?;
                let built = T::construct(self)?;
                drop(guard);
                Ok(Arc::new(built))
            }
        }
    }

    /// Resolve a previously registered binding.
    ///
    /// Unlike [`get`](Self::get) this never autowires: an unknown identifier
    /// fails with `ServiceNotFound`.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        let id = TypeId::of::<T>();

        if let Some(cached) = self.shared.read().unwrap().get(&id) {
            return downcast::<T>(cached.clone());
        }

        let binding = self.bindings.read().unwrap().get(&id).cloned();
        match binding {
            Some(binding) => self.build_bound::<T>(id, binding),
            None => {
                debug!(
                    target: "gantry::container",
                    "Service not found: {}",
                    type_name::<T>()
                );
                Err(Error::ServiceNotFound(type_name::<T>().to_string()))
            }
        }
    }

    /// Fetch a bound value by clone — the path for scalar and trait-object
    /// constructor arguments. A missing binding is an unsatisfiable argument,
    /// not a missing service: the caller is a constructor that cannot proceed.
    pub fn value<T: Clone + Send + Sync + 'static>(&self) -> Result<T, Error> {
        match self.resolve::<T>() {
            Ok(arc) => Ok((*arc).clone()),
            Err(Error::ServiceNotFound(name)) => Err(Error::UnsatisfiableArgument(name)),
            Err(e) => Err(e),
        }
    }

    fn build_bound<T: Send + Sync + 'static>(
        &self,
        id: TypeId,
        binding: Binding,
    ) -> Result<Arc<T>, Error> {
        match binding {
            Binding::Instance(any) => downcast::<T>(any),
            Binding::Factory { build, shared } => {
                let guard = ResolveGuard::enter(id, type_name::<T>())?;
                let built = build(self)?;
                drop(guard);

                if shared {
                    // First build wins: if another thread cached an instance
                    // while we were constructing, every caller still observes
                    // the same one.
                    let mut cache = self.shared.write().unwrap();
                    let instance = cache.entry(id).or_insert(built).clone();
                    debug!(
                        target: "gantry::container",
                        "Cached shared instance: {}",
                        type_name::<T>()
                    );
                    downcast::<T>(instance)
                } else {
                    downcast::<T>(built)
                }
            }
        }
    }
}

fn downcast<T: Send + Sync + 'static>(any: AnyArc) -> Result<Arc<T>, Error> {
    any.downcast::<T>().map_err(|_| {
        Error::Internal(format!(
            "binding for {} holds a value of a different type",
            type_name::<T>()
        ))
    })
}
