use std::io;
use std::time::Duration;

/// A connected stream whose blocking reads and writes accept an OS-level timeout.
///
/// The deadline-bound frame operations shrink these timeouts as their deadline
/// approaches, so the blocking call itself returns instead of outliving the
/// deadline. Implementors must report an elapsed timeout as an I/O error of
/// kind `WouldBlock` or `TimedOut`, which is what the standard library
/// sockets do.
pub trait DeadlineStream {
    /// Current read timeout (`None` blocks indefinitely).
    fn read_timeout(&self) -> io::Result<Option<Duration>>;

    /// Set the read timeout. `Some(Duration::ZERO)` is invalid.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Current write timeout (`None` blocks indefinitely).
    fn write_timeout(&self) -> io::Result<Option<Duration>>;

    /// Set the write timeout. `Some(Duration::ZERO)` is invalid.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

macro_rules! impl_deadline_stream {
    ($ty:ty) => {
        impl DeadlineStream for $ty {
            fn read_timeout(&self) -> io::Result<Option<Duration>> {
                <$ty>::read_timeout(self)
            }

            fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
                <$ty>::set_read_timeout(self, timeout)
            }

            fn write_timeout(&self) -> io::Result<Option<Duration>> {
                <$ty>::write_timeout(self)
            }

            fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
                <$ty>::set_write_timeout(self, timeout)
            }
        }
    };
}

impl_deadline_stream!(std::net::TcpStream);

#[cfg(unix)]
impl_deadline_stream!(std::os::unix::net::UnixStream);

impl<S: DeadlineStream + ?Sized> DeadlineStream for &mut S {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        (**self).read_timeout()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn write_timeout(&self) -> io::Result<Option<Duration>> {
        (**self).write_timeout()
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_write_timeout(timeout)
    }
}
