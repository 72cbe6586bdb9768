//! Heap-internal logging.
//!
//! With the `logging` feature these forward to `log`. Without it they
//! expand to nothing, so the heap never calls into a logger while a
//! [`HeapLock`](crate::HeapLock) is held.

#[cfg(feature = "logging")]
macro_rules! debug {
    ($($arg:tt)+) => { log::debug!($($arg)+) };
}

#[cfg(feature = "logging")]
macro_rules! trace {
    ($($arg:tt)+) => { log::trace!($($arg)+) };
}

// the arguments are still type checked, never formatted
#[cfg(not(feature = "logging"))]
macro_rules! debug {
    ($($arg:tt)+) => {
        if false {
            let _ = format_args!($($arg)+);
        }
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! trace {
    ($($arg:tt)+) => {
        if false {
            let _ = format_args!($($arg)+);
        }
    };
}
