//! Full transport lifecycle in an isolated process: this file must hold
//! exactly one test so the reference count is observable from zero.

use rwire_channel::{ChannelError, InitOptions, Transport};

#[test]
fn transport_initializes_and_tears_down() {
    assert!(matches!(
        Transport::current_options(),
        Err(ChannelError::NotInitialized)
    ));

    let options = InitOptions {
        global_locking: true,
    };
    let first = Transport::initialize(options).unwrap();
    assert!(first.global_locking());
    let second = Transport::initialize(options).unwrap();
    let third = first.clone();

    assert_eq!(Transport::current_options().unwrap(), options);

    drop(first);
    drop(second);
    assert!(Transport::current_options().is_ok());

    drop(third);
    assert!(matches!(
        Transport::current_options(),
        Err(ChannelError::NotInitialized)
    ));

    // re-initialization after teardown may pick new options
    let fresh = Transport::initialize(InitOptions::default()).unwrap();
    assert!(!fresh.global_locking());
}
