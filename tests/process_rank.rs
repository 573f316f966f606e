use std::sync::Mutex;

use reid_data::dist::{is_main_process, rank};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in ["RANK", "LOCAL_RANK"] {
        std::env::remove_var(key);
    }
}

#[test]
fn single_process_is_rank_zero() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    assert_eq!(rank(), 0);
    assert!(is_main_process());
}

#[test]
fn local_rank_is_used_without_rank() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("LOCAL_RANK", "2");

    let (got, main) = (rank(), is_main_process());
    clear_env();
    assert_eq!(got, 2);
    assert!(!main);
}

#[test]
fn rank_takes_precedence_over_local_rank() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("RANK", "1");
    std::env::set_var("LOCAL_RANK", "5");
    assert_eq!(rank(), 1);

    std::env::set_var("RANK", "0");
    let main = is_main_process();
    clear_env();
    assert!(main);
}

#[test]
fn empty_rank_falls_through_to_local_rank() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("RANK", " ");
    std::env::set_var("LOCAL_RANK", "4");

    let got = rank();
    clear_env();
    assert_eq!(got, 4);
}

#[test]
fn non_numeric_rank_counts_as_main() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("RANK", "abc");
    std::env::set_var("LOCAL_RANK", "3");

    let (got, main) = (rank(), is_main_process());
    clear_env();
    assert_eq!(got, 0);
    assert!(main);
}
