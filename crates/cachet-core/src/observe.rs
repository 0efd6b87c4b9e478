// ── Observable values ──
//
// A single value with bound callbacks, for view state that is not an
// entity. Callbacks run synchronously on the thread calling `set`, in
// binding order, after the value lock has been released.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

type NewCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ChangeCallback<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

enum Binding<T> {
    New(NewCallback<T>),
    /// Receives `(new, old)`.
    Change(ChangeCallback<T>),
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        match self {
            Self::New(f) => Self::New(Arc::clone(f)),
            Self::Change(f) => Self::Change(Arc::clone(f)),
        }
    }
}

/// A value that notifies its bindings whenever it is [`set`](Self::set).
pub struct Observable<T> {
    value: RwLock<T>,
    bindings: Mutex<Vec<Binding<T>>>,
}

impl<T> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            bindings: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Call `f` with every new value.
    pub fn bind(&self, f: impl Fn(&T) + Send + Sync + 'static) {
        self.push(Binding::New(Arc::new(f)));
    }

    /// Like [`bind`](Self::bind), then call `f` once with the current value.
    pub fn bind_and_run(&self, f: impl Fn(&T) + Send + Sync + 'static) {
        let f: NewCallback<T> = Arc::new(f);
        self.push(Binding::New(Arc::clone(&f)));
        f(&self.value.read().unwrap_or_else(PoisonError::into_inner));
    }

    /// Call `f` with `(new, old)` on every change.
    pub fn bind_change(&self, f: impl Fn(&T, &T) + Send + Sync + 'static) {
        self.push(Binding::Change(Arc::new(f)));
    }

    /// Like [`bind_change`](Self::bind_change), then call `f` once with the
    /// current value as both new and old.
    pub fn bind_change_and_run(&self, f: impl Fn(&T, &T) + Send + Sync + 'static) {
        let f: ChangeCallback<T> = Arc::new(f);
        self.push(Binding::Change(Arc::clone(&f)));
        let current = self.value.read().unwrap_or_else(PoisonError::into_inner);
        f(&current, &current);
    }

    /// Replace the value and notify every binding.
    pub fn set(&self, value: T)
    where
        T: Clone,
    {
        let old = self.replace(value.clone());
        let bindings = self
            .bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for binding in &bindings {
            match binding {
                Binding::New(f) => f(&value),
                Binding::Change(f) => f(&value, &old),
            }
        }
    }

    /// Replace the value without notifying anyone.
    pub fn set_silently(&self, value: T) {
        self.replace(value);
    }

    pub fn binding_count(&self) -> usize {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn replace(&self, value: T) -> T {
        let mut slot = self.value.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, value)
    }

    fn push(&self, binding: Binding<T>) {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(binding);
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.value.read().unwrap_or_else(PoisonError::into_inner))
            .field("bindings", &self.binding_count())
            .finish()
    }
}
