use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use portcullis_core::InstanceId;
use portcullis_events::{EventBus, InstanceScoped, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Projection worker loop.
///
/// Subscribes to a bus and feeds every message to a handler until shut down
/// or the bus goes away. Handler failures are logged and the loop moves on;
/// redelivery is the handler's concern.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread that processes events from the bus subscription.
    ///
    /// With `instance_id` set, messages of other instances are ignored.
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: B,
        instance_id: Option<InstanceId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: InstanceScoped + Send + 'static,
        B: EventBus<M> + Send + Sync + 'static,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, instance_id, &mut handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    instance_id: Option<InstanceId>,
    handler: &mut H,
) where
    M: InstanceScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Some(expected) = &instance_id {
                    if msg.instance_id() != expected {
                        continue;
                    }
                }

                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "projection worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(worker = name, "projection worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use portcullis_events::InMemoryEventBus;

    use super::*;

    #[derive(Debug, Clone)]
    struct Msg {
        instance: InstanceId,
        n: u32,
    }

    impl InstanceScoped for Msg {
        fn instance_id(&self) -> &InstanceId {
            &self.instance
        }
    }

    fn wait_for(seen: &Mutex<Vec<u32>>, len: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().len() < len && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn pinned_worker_ignores_other_instances_and_survives_failures() {
        let bus = Arc::new(InMemoryEventBus::<Msg>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let handle = ProjectionWorker::spawn(
            "test-worker",
            bus.clone(),
            Some(InstanceId::new("i1")),
            move |msg: Msg| -> Result<(), String> {
                sink.lock().unwrap().push(msg.n);
                if msg.n == 1 { Err("boom".to_string()) } else { Ok(()) }
            },
        )
        .unwrap();

        for (instance, n) in [("i1", 1), ("i2", 2), ("i1", 3)] {
            bus.publish(Msg {
                instance: InstanceId::new(instance),
                n,
            })
            .unwrap();
        }

        wait_for(&seen, 2);
        handle.shutdown();
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }
}
