use blog_portal::{
    context::RequestContext,
    models::{Identity, Role},
};
use std::{panic, sync::Arc, time::Duration};
use uuid::Uuid;

fn identity(n: usize) -> Identity {
    let role = match n % 3 {
        0 => Role::Admin,
        1 => Role::Author,
        _ => Role::User,
    };
    Identity {
        user_id: Uuid::new_v4(),
        username: format!("user-{n}"),
        role,
    }
}

#[test]
fn test_empty_context_is_unauthenticated() {
    let context = RequestContext::new();
    assert!(context.get().is_none());
    assert!(!context.is_authenticated());
}

#[test]
fn test_set_get_clear() {
    let context = RequestContext::new();
    let who = identity(1);
    context.set(who.clone());
    assert_eq!(context.get(), Some(who));
    assert!(context.is_authenticated());

    context.clear();
    assert!(context.get().is_none());
}

#[test]
fn test_guard_clears_on_normal_exit() {
    let context = RequestContext::new();
    {
        let _guard = context.guard();
        context.set(identity(0));
        assert!(context.is_authenticated());
    }
    assert!(!context.is_authenticated());
}

#[test]
fn test_guard_clears_when_handler_panics() {
    let context = RequestContext::new();
    let inner = Arc::clone(&context);

    let result = panic::catch_unwind(move || {
        let guard = inner.guard();
        guard.context().set(identity(2));
        panic!("handler blew up");
    });

    assert!(result.is_err());
    assert!(
        context.get().is_none(),
        "identity must not survive a panicking request"
    );
}

#[test]
fn test_guard_clears_on_early_error_return() {
    fn operation(context: &Arc<RequestContext>) -> Result<(), &'static str> {
        let _guard = context.guard();
        context.set(identity(1));
        Err::<(), _>("business error")?;
        Ok(())
    }

    let context = RequestContext::new();
    assert!(operation(&context).is_err());
    assert!(context.get().is_none());
}

#[tokio::test]
async fn test_guard_clears_when_request_future_is_cancelled() {
    let context = RequestContext::new();
    let inner = Arc::clone(&context);

    let request = tokio::spawn(async move {
        let _guard = inner.guard();
        inner.set(identity(0));
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(context.is_authenticated());

    request.abort();
    let _ = request.await;
    assert!(context.get().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_observe_each_other() {
    let mut handles = Vec::new();

    for n in 0..64 {
        handles.push(tokio::spawn(async move {
            let context = RequestContext::new();
            let _guard = context.guard();
            let me = identity(n);
            context.set(me.clone());

            for _ in 0..20 {
                tokio::task::yield_now().await;
                assert_eq!(context.get().as_ref(), Some(&me));
            }
        }));
    }

    for handle in handles {
        handle.await.expect("a request observed a foreign identity");
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_reused_worker_starts_with_empty_context() {
    // Sequential requests on one worker thread: the second, anonymous request must not
    // inherit the first request's identity.
    {
        let first = RequestContext::new();
        let _guard = first.guard();
        first.set(identity(0));
    }

    let second = RequestContext::new();
    let _guard = second.guard();
    assert!(second.get().is_none());
}
