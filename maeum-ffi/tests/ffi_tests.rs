use maeum_ffi::*;
use std::ffi::{CStr, CString};
use tempfile::tempdir;

#[test]
fn ffi_select_and_generate() {
    let dir = tempdir().unwrap();
    write_demo_artifacts(dir.path(), 3).unwrap();

    unsafe {
        let path = CString::new(dir.path().to_str().unwrap()).unwrap();
        let engine = maeum_engine_new_in_dir(path.as_ptr());
        assert!(!engine.is_null());

        let name = CString::new("기본 모델").unwrap();
        assert_eq!(maeum_select_model(engine, name.as_ptr()), 0);

        let text = CString::new("오늘 날씨 좋다").unwrap();
        let reply = maeum_generate_response(engine, text.as_ptr(), 0.7);
        assert!(!reply.is_null());
        let words = CStr::from_ptr(reply).to_str().unwrap().split_whitespace().count();
        assert!(words <= 58);
        maeum_string_free(reply);

        let name = CString::new("고급 모델").unwrap();
        assert_eq!(maeum_select_model(engine, name.as_ptr()), 0);
        assert_eq!(
            (*engine).bot().active_model().unwrap().variant(),
            maeum::ModelVariant::Advanced
        );

        maeum_engine_free(engine);
    }
}

#[test]
fn ffi_greeting_without_model() {
    let engine = maeum_engine_new(std::ptr::null());
    assert!(!engine.is_null());
    unsafe {
        let text = CString::new("안녕").unwrap();
        let reply = maeum_generate_response(engine, text.as_ptr(), 0.5);
        assert!(!reply.is_null());
        let reply_text = CStr::from_ptr(reply).to_str().unwrap().to_owned();
        assert!((*engine)
            .bot()
            .rules()
            .responses(maeum::Intent::Greeting)
            .contains(&reply_text));
        maeum_string_free(reply);
        maeum_engine_free(engine);
    }
}

#[test]
fn ffi_errors_map_to_sentinels() {
    let engine = maeum_engine_new(std::ptr::null());
    unsafe {
        let unknown = CString::new("huge").unwrap();
        assert_eq!(maeum_select_model(engine, unknown.as_ptr()), -1);
        assert_eq!(maeum_select_model(std::ptr::null_mut(), unknown.as_ptr()), -1);

        // No model loaded and no rule matches.
        let text = CString::new("뭐 해").unwrap();
        assert!(maeum_generate_response(engine, text.as_ptr(), 0.5).is_null());
        // Temperature outside (0, 1].
        let hello = CString::new("안녕").unwrap();
        assert!(maeum_generate_response(engine, hello.as_ptr(), 2.0).is_null());
        assert!(maeum_generate_response(engine, std::ptr::null(), 0.5).is_null());

        maeum_engine_free(engine);
    }
}

#[test]
fn ffi_missing_config_file_yields_null() {
    let path = CString::new("/nonexistent/maeum.json").unwrap();
    assert!(maeum_engine_new(path.as_ptr()).is_null());
}

#[test]
fn ffi_rejects_non_utf8_paths() {
    let path = CString::new(vec![b'/', 0xff, 0xfe, b'x']).unwrap();
    assert!(maeum_engine_new(path.as_ptr()).is_null());
    assert!(maeum_engine_new_in_dir(path.as_ptr()).is_null());
}
