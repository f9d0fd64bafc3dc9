use super::*;

#[test]
fn test_task_config_default() {
    let config = TaskConfig::default();
    assert_eq!(config.cdp_url, "http://localhost:9222");
    assert_eq!(config.global_timeout_ms, 180_000);
    assert_eq!(config.answer_wait_ms, 300_000);
    assert_eq!(config.wait_timeout_ms, 600_000);
    assert_eq!(config.stabilize_ms, 6_000);
    assert_eq!(config.inter_task_delay_ms, 800);
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.retry_delay_ms, 10_000);
    assert!(config.download);
    assert!(config.keep_audio);
    assert!(!config.skip_mode_switch);
    assert!(config.prompts.is_empty());
}

#[test]
fn test_empty_json_matches_default() {
    let config: TaskConfig = serde_json::from_str("{}").unwrap();
    let default = TaskConfig::default();
    assert_eq!(config.max_retries, default.max_retries);
    assert_eq!(config.poll_interval_ms, default.poll_interval_ms);
    assert_eq!(config.acquisition, default.acquisition);
    assert_eq!(config.transcode, default.transcode);
    assert_eq!(config.login, default.login);
}

#[test]
fn test_camel_case_aliases() {
    let json = r#"{
        "outputPath": "/tmp/out.mp4",
        "waitTimeout": 5000,
        "cdpUrl": "http://10.0.0.2:9222",
        "keepAudio": false,
        "maxRetries": 2,
        "retryDelay": 100,
        "aspectRatio": "portrait"
    }"#;
    let config: TaskConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/out.mp4")));
    assert_eq!(config.wait_timeout_ms, 5000);
    assert_eq!(config.cdp_url, "http://10.0.0.2:9222");
    assert!(!config.keep_audio);
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.retry_delay_ms, 100);
    assert_eq!(config.variant.as_deref(), Some("portrait"));
}

#[test]
fn test_prompts_field_is_not_deserialized() {
    let config: TaskConfig =
        serde_json::from_str(r#"{"prompts": [{"text": "hi"}]}"#).unwrap();
    assert!(config.prompts.is_empty());
}

#[test]
fn test_prompt_result_key() {
    assert_eq!(PromptItem::new(3, "x").result_key(), "result_p3");
}

#[test]
fn test_workflow_chat_deserialize() {
    let json = r##"{
        "workflow": {
            "kind": "chat",
            "input": "#prompt",
            "message": [".msg", {"css": "div", "text": "Assistant"}],
            "busy": "#stop"
        }
    }"##;
    let config: TaskConfig = serde_json::from_str(json).unwrap();
    let Some(WorkflowConfig::Chat(chat)) = config.workflow else {
        panic!("expected chat workflow");
    };
    assert_eq!(chat.input.len(), 1);
    assert_eq!(chat.message.len(), 2);
    assert!(chat.send_button.is_empty());
    assert!(chat.modes.is_empty());
}

#[test]
fn test_workflow_generation_defaults() {
    let json = r#"{
        "kind": "generation",
        "prompt_input": "textarea",
        "create_button": "button.create",
        "completion": [{"kind": "element_appears", "selector": "video"}]
    }"#;
    let workflow: WorkflowConfig = serde_json::from_str(json).unwrap();
    let WorkflowConfig::Generation(generation) = workflow else {
        panic!("expected generation workflow");
    };
    assert_eq!(generation.error_dialog.len(), 4);
    assert_eq!(generation.error_patterns.len(), 2);
    assert_eq!(generation.poll_ms, 5_000);
    assert!(matches!(
        generation.completion[0],
        CompletionRule::ElementAppears { .. }
    ));
}

#[test]
fn test_count_increased_rule() {
    let json = r##"{"kind": "count_increased", "items": ".clip", "ready": "#add"}"##;
    let rule: CompletionRule = serde_json::from_str(json).unwrap();
    let CompletionRule::CountIncreased { items, ready } = rule else {
        panic!("expected count rule");
    };
    assert_eq!(items.label(), ".clip");
    assert!(ready.is_some());
}

#[test]
fn test_resolved_workflow_prefers_explicit() {
    let mut config = TaskConfig {
        preset: Some(Preset::Gemini),
        ..Default::default()
    };
    assert_eq!(config.resolved_workflow().map(|w| w.kind()), Some("chat"));

    config.workflow = Some(Preset::Flow.workflow());
    assert_eq!(
        config.resolved_workflow().map(|w| w.kind()),
        Some("generation")
    );
}

#[test]
fn test_resolved_workflow_none() {
    assert!(TaskConfig::default().resolved_workflow().is_none());
}

#[test]
fn test_resolved_goto_url() {
    let mut config = TaskConfig {
        preset: Some(Preset::Chatgpt),
        ..Default::default()
    };
    assert_eq!(
        config.resolved_goto_url().as_deref(),
        Some("https://chatgpt.com/")
    );
    config.goto_url = Some("https://chatgpt.com/g/custom".to_string());
    assert_eq!(
        config.resolved_goto_url().as_deref(),
        Some("https://chatgpt.com/g/custom")
    );
}

#[test]
fn test_resolved_login_uses_preset_ready_element() {
    let config = TaskConfig {
        preset: Some(Preset::Chatgpt),
        ..Default::default()
    };
    let login = config.resolved_login();
    assert_eq!(
        login.required.map(|r| r.label()),
        Some("#prompt-textarea".to_string())
    );
}

#[test]
fn test_login_url_markers() {
    let login = LoginCheck::default();
    assert!(login.is_login_url("https://accounts.google.com/v3/signin"));
    assert!(login.is_login_url("https://auth0.openai.com/u/login"));
    assert!(!login.is_login_url("https://chatgpt.com/"));
}

#[test]
fn test_presets_are_complete() {
    for preset in [Preset::Chatgpt, Preset::Gemini, Preset::Flow] {
        match preset.workflow() {
            WorkflowConfig::Chat(chat) => {
                assert!(!chat.input.is_empty());
                assert!(!chat.message.is_empty());
                assert!(!chat.busy.is_empty());
            }
            WorkflowConfig::Generation(generation) => {
                assert!(!generation.prompt_input.is_empty());
                assert!(!generation.create_button.is_empty());
                assert!(!generation.completion.is_empty());
                assert!(!generation.download_button.is_empty());
            }
        }
    }
}

#[test]
fn test_gemini_modes() {
    let WorkflowConfig::Chat(chat) = Preset::Gemini.workflow() else {
        panic!("gemini is a chat workflow");
    };
    let think = &chat.modes["think"];
    assert!(think.opener.is_some());
    assert_eq!(think.active_text.as_deref(), Some("思考モード"));
}

#[test]
fn test_preset_deserialize() {
    let config: TaskConfig = serde_json::from_str(r#"{"preset": "flow"}"#).unwrap();
    assert_eq!(config.preset, Some(Preset::Flow));
}

#[test]
fn test_acquisition_defaults() {
    let acq = AcquisitionConfig::default();
    assert_eq!(
        acq.strategies,
        vec![
            Strategy::Direct,
            Strategy::ClickDownload,
            Strategy::NetworkCapture,
            Strategy::FilesystemScan
        ]
    );
    assert_eq!(acq.recency_ms, 300_000);
    assert_eq!(acq.min_size_bytes, 100_000);
    assert_eq!(acq.scan_extensions, vec!["mp4".to_string()]);
}

#[test]
fn test_strategy_names() {
    let json = serde_json::to_string(&Strategy::NetworkCapture).unwrap();
    assert_eq!(json, "\"network_capture\"");
    assert_eq!(Strategy::ClickDownload.as_str(), "click_download");
}

#[test]
fn test_toml_task_config() {
    let content = r#"
        preset = "chatgpt"
        max_retries = 2

        [acquisition]
        strategies = ["direct", "filesystem_scan"]
        min_size_bytes = 10

        [transcode]
        enabled = false
    "#;
    let config: TaskConfig = toml::from_str(content).unwrap();
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.acquisition.strategies.len(), 2);
    assert_eq!(config.acquisition.min_size_bytes, 10);
    assert!(!config.transcode.enabled);
    assert_eq!(config.transcode.program, "ffmpeg");
}

#[test]
fn test_preset_from_str() {
    assert_eq!("Gemini".parse::<Preset>().unwrap(), Preset::Gemini);
    assert_eq!(" flow ".parse::<Preset>().unwrap(), Preset::Flow);
    let err = "bard".parse::<Preset>().unwrap_err();
    assert!(err.to_string().contains("unknown preset 'bard'"));
}
