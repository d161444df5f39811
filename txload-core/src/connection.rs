use std::future::Future;

/// Per-worker connection lifecycle.
#[derive(Debug, Default)]
pub enum ConnectionState<T> {
    #[default]
    Disconnected,
    Connected(T),
}

impl<T> ConnectionState<T> {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Returns the live connection, dialing first when disconnected.
    ///
    /// A failed dial leaves the state `Disconnected` so the next call retries.
    pub async fn ensure<F, Fut, E>(&mut self, connect: F) -> Result<&mut T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Self::Disconnected = self {
            *self = Self::Connected(connect().await?);
        }
        match self {
            Self::Connected(conn) => Ok(conn),
            Self::Disconnected => unreachable!("connected above"),
        }
    }

    /// Drops the connection. Returns whether one was held.
    pub fn reset(&mut self) -> bool {
        matches!(std::mem::take(self), Self::Connected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_connect_stays_disconnected_and_retries() {
        let mut state: ConnectionState<u32> = ConnectionState::default();
        let mut attempts = 0;

        let res = state
            .ensure(|| {
                attempts += 1;
                async { Err::<u32, &str>("refused") }
            })
            .await;
        assert_eq!(res, Err("refused"));
        assert!(!state.is_connected());

        let res = state
            .ensure(|| {
                attempts += 1;
                async { Ok::<u32, &str>(7) }
            })
            .await
            .copied();
        assert_eq!(res, Ok(7));
        assert!(state.is_connected());

        // Already connected: no dial.
        let res = state
            .ensure(|| {
                attempts += 1;
                async { Ok::<u32, &str>(8) }
            })
            .await
            .copied();
        assert_eq!(res, Ok(7));
        assert_eq!(attempts, 2);

        assert!(state.reset());
        assert!(!state.reset());
    }
}
