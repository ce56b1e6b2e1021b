mod common;

use axum::http::StatusCode;
use common::{JEB, NOTCH, SERVER, TOKEN, call, read_json, send_request, setup, setup_wired};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn put_varint(out: &mut Vec<u8>, value: usize) {
    let mut value = value as u32;
    while value & !0x7F != 0 {
        out.push((value & 0x7F | 0x80) as u8);
        value >>= 7;
    }
    out.push(value as u8);
}

async fn read_varint(socket: &mut tokio::net::TcpStream) -> usize {
    let mut value = 0usize;
    for shift in 0..5 {
        let byte = socket.read_u8().await.unwrap();
        value |= ((byte & 0x7F) as usize) << (7 * shift);
        if byte & 0x80 == 0 {
            break;
        }
    }
    value
}

/// Game server stand-in answering one status ping with `json`.
async fn status_server(json: String) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        for _ in 0..2 {
            let len = read_varint(&mut socket).await;
            let mut packet = vec![0; len];
            socket.read_exact(&mut packet).await.unwrap();
        }
        let mut payload = vec![0x00];
        put_varint(&mut payload, json.len());
        payload.extend_from_slice(json.as_bytes());
        let mut frame = Vec::new();
        put_varint(&mut frame, payload.len());
        frame.extend_from_slice(&payload);
        socket.write_all(&frame).await.unwrap();
    });
    port
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    // GIVEN: A running application
    let app = setup().await;

    // WHEN: Making a GET request to /health without a token
    let (status, _body) = send_request(&app, "GET", "/health", None, None).await;

    // THEN: Should return 200 OK
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_endpoint_with_post_method() {
    // GIVEN: A running application
    let app = setup().await;

    // WHEN: Making a POST request to /health (wrong method)
    let (status, _body) = send_request(&app, "POST", "/health", None, None).await;

    // THEN: Should return 405 Method Not Allowed
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

// =============================================================================
// MERGED READ TESTS
// =============================================================================

#[tokio::test]
async fn test_overview_of_empty_offline_server() {
    // GIVEN: A server with no authority files that does not answer pings
    let app = setup().await;

    // WHEN: Reading the merged view
    let (status, body) = call(&app, "GET", "", None).await;

    // THEN: Every list is present and empty, and the server reads offline
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["online"], false);
    assert_eq!(body["online_mode"], true);
    assert_eq!(body["opped"], json!([]));
    assert_eq!(body["banned"], json!({ "players": [], "ips": [] }));
    assert_eq!(body["whitelist"], json!({ "enabled": false, "list": [] }));
    assert!(body.get("players").is_none());
}

#[tokio::test]
async fn test_overview_with_online_players() {
    // GIVEN: Two players online and a whitelist
    let app = setup().await;
    app.ping.set_online(&[(NOTCH, "Notch"), (JEB, "jeb_")]);
    app.daemon
        .put_file(SERVER, "/server.properties", "white-list=true\nonline-mode=true\n");
    app.daemon.put_file(
        SERVER,
        "/whitelist.json",
        &format!(r#"[{{"uuid":"{NOTCH}","name":"Notch"}},{{"uuid":"{JEB}","name":"jeb_"}}]"#),
    );

    // WHEN: Reading the merged view
    let (status, body) = call(&app, "GET", "", None).await;

    // THEN: Presence is included and lists are sorted case-insensitively
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], true);
    assert_eq!(body["whitelist"]["enabled"], true);
    assert_eq!(body["whitelist"]["list"][0]["name"], "jeb_");
    assert_eq!(body["players"]["online"], 2);
    assert_eq!(body["players"]["max"], 20);
    assert_eq!(body["players"]["list"][1]["uuid"], NOTCH);
    assert!(
        body["players"]["list"][1]["render"]
            .as_str()
            .unwrap()
            .contains("user=069a79f444e94726a5befca90e38aaf5")
    );
}

// =============================================================================
// AUTHORITY MUTATION TESTS
// =============================================================================

#[tokio::test]
async fn test_op_by_name() {
    // GIVEN: An empty op list
    let app = setup().await;

    // WHEN: Granting operator to Notch
    let (status, body) = call(&app, "PUT", "/op", Some(json!({ "name": "Notch" }))).await;

    // THEN: The op list holds exactly Notch at level 4
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert_eq!(
        read_json(&app, "/ops.json"),
        json!([{ "uuid": NOTCH, "name": "Notch", "level": 4, "bypassesPlayerLimit": true }])
    );

    // AND: The console was told and the action audited
    assert_eq!(app.daemon.commands(SERVER), vec!["op Notch"]);
    let events = app.audit.recent_events(SERVER.to_string(), 10).await.unwrap();
    assert_eq!(events[0].event, "server:player.op");
    assert_eq!(events[0].properties["name"], "Notch");
}

#[tokio::test]
async fn test_op_twice_conflicts() {
    // GIVEN: Notch is already an operator
    let app = setup().await;
    call(&app, "PUT", "/op", Some(json!({ "name": "Notch" }))).await;

    // WHEN: Granting operator again
    let (status, body) = call(&app, "PUT", "/op", Some(json!({ "name": "Notch" }))).await;

    // THEN: Should return 400 with the conflict message
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "success": false, "error": "Player is already an operator" }));
}

#[tokio::test]
async fn test_deop_removes_operator() {
    // GIVEN: Notch is an operator
    let app = setup().await;
    call(&app, "PUT", "/op", Some(json!({ "name": "Notch" }))).await;

    // WHEN: Revoking by uuid
    let (status, _body) = call(&app, "DELETE", "/op", Some(json!({ "uuid": NOTCH }))).await;

    // THEN: The op list is empty
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read_json(&app, "/ops.json"), json!([]));
    assert_eq!(app.daemon.commands(SERVER), vec!["op Notch", "deop Notch"]);
}

#[tokio::test]
async fn test_unknown_player_cannot_be_whitelisted() {
    // GIVEN: A name no provider knows
    let app = setup().await;

    // WHEN: Adding it to the whitelist
    let (status, body) = call(&app, "PUT", "/whitelist", Some(json!({ "name": "Nobody" }))).await;

    // THEN: Lookup fails closed
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Failed to lookup player");
    assert!(app.daemon.file(SERVER, "/whitelist.json").is_none());
}

#[tokio::test]
async fn test_whitelist_add_and_remove() {
    // GIVEN: A server running Paper
    let app = setup().await;
    app.daemon.put_file(SERVER, "/bukkit.yml", "settings:\n  allow-end: true\n");

    // WHEN: Adding then removing jeb_
    let (added, _) = call(&app, "PUT", "/whitelist", Some(json!({ "name": "jeb_" }))).await;
    let (removed, _) = call(&app, "DELETE", "/whitelist", Some(json!({ "uuid": JEB }))).await;
    let (again, body) = call(&app, "DELETE", "/whitelist", Some(json!({ "uuid": JEB }))).await;

    // THEN: Both succeed with namespaced commands, the repeat conflicts
    assert_eq!(added, StatusCode::OK);
    assert_eq!(removed, StatusCode::OK);
    assert_eq!(again, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Player is not whitelisted");
    assert_eq!(
        app.daemon.commands(SERVER),
        vec!["minecraft:whitelist add jeb_", "minecraft:whitelist remove jeb_"]
    );
}

#[tokio::test]
async fn test_whitelist_toggle_updates_properties() {
    // GIVEN: Whitelist disabled and already read once
    let app = setup().await;
    app.daemon
        .put_file(SERVER, "/server.properties", "motd=hello\nwhite-list=false\n");
    let (_, before) = call(&app, "GET", "", None).await;
    assert_eq!(before["whitelist"]["enabled"], false);

    // WHEN: Enabling the whitelist
    let (status, _) = call(&app, "POST", "/whitelist/status", Some(json!({ "enabled": true }))).await;

    // THEN: The file is rewritten and the next read sees it immediately
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.daemon.file(SERVER, "/server.properties").unwrap(),
        "motd=hello\nwhite-list=true\n"
    );
    let (_, after) = call(&app, "GET", "", None).await;
    assert_eq!(after["whitelist"]["enabled"], true);
}

#[tokio::test]
async fn test_ban_and_unban() {
    // GIVEN: An empty ban list
    let app = setup().await;

    // WHEN: Banning Notch with a reason
    let (status, _) = call(
        &app,
        "PUT",
        "/ban",
        Some(json!({ "name": "Notch", "reason": "griefing spawn" })),
    )
    .await;

    // THEN: The ban is recorded forever with our reason
    assert_eq!(status, StatusCode::OK);
    let bans = read_json(&app, "/banned-players.json");
    assert_eq!(bans[0]["uuid"], NOTCH);
    assert_eq!(bans[0]["expires"], "forever");
    assert_eq!(bans[0]["reason"], "griefing spawn");

    // AND: Unbanning clears it
    let (status, _) = call(&app, "DELETE", "/ban", Some(json!({ "uuid": NOTCH }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read_json(&app, "/banned-players.json"), json!([]));
    assert_eq!(
        app.daemon.commands(SERVER),
        vec!["ban Notch griefing spawn", "pardon Notch"]
    );
}

#[tokio::test]
async fn test_ban_ip_twice() {
    // GIVEN: A running application
    let app = setup().await;

    // WHEN: Banning the same IP twice
    let (first, _) = call(&app, "PUT", "/ban-ip", Some(json!({ "ip": "127.0.0.1" }))).await;
    let list_after_first = read_json(&app, "/banned-ips.json");
    let (second, body) = call(&app, "PUT", "/ban-ip", Some(json!({ "ip": "127.0.0.1" }))).await;

    // THEN: The second call is rejected and the list is unchanged
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "success": false, "error": "IP is already banned" }));
    assert_eq!(read_json(&app, "/banned-ips.json"), list_after_first);
    assert_eq!(list_after_first[0]["reason"], "Banned by an operator.");
}

#[tokio::test]
async fn test_unban_ip_not_banned() {
    // GIVEN: No IP bans
    let app = setup().await;

    // WHEN: Lifting a ban that does not exist
    let (status, body) = call(&app, "DELETE", "/ban-ip", Some(json!({ "ip": "10.1.2.3" }))).await;

    // THEN: Should return 400
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "IP is not banned");
}

#[tokio::test]
async fn test_console_down_does_not_fail_authority_change() {
    // GIVEN: The console rejects every command
    let app = setup().await;
    app.daemon.set_console_offline(true);

    // WHEN: Granting operator
    let (status, _) = call(&app, "PUT", "/op", Some(json!({ "name": "jeb_" }))).await;

    // THEN: The file change still succeeds
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read_json(&app, "/ops.json")[0]["name"], "jeb_");
}

// =============================================================================
// LIVE ACTION TESTS
// =============================================================================

#[tokio::test]
async fn test_kick_online_player() {
    // GIVEN: jeb_ is online
    let app = setup().await;
    app.ping.set_online(&[(JEB, "jeb_")]);

    // WHEN: Kicking jeb_
    let (status, _) = call(
        &app,
        "POST",
        "/kick",
        Some(json!({ "uuid": JEB, "reason": "take a break" })),
    )
    .await;

    // THEN: The kick command is sent
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.daemon.commands(SERVER), vec!["kick jeb_ take a break"]);
}

#[tokio::test]
async fn test_kick_offline_player() {
    // GIVEN: Only Notch is online
    let app = setup().await;
    app.ping.set_online(&[(NOTCH, "Notch")]);

    // WHEN: Kicking jeb_
    let (status, body) = call(
        &app,
        "POST",
        "/kick",
        Some(json!({ "uuid": JEB, "reason": "take a break" })),
    )
    .await;

    // THEN: Should return 400 Player is not online
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Player is not online");
}

#[tokio::test]
async fn test_kick_over_status_ping() {
    // GIVEN: A game server whose status ping lists jeb_
    let port = status_server(format!(
        r#"{{"players":{{"max":10,"online":1,"sample":[{{"id":"{JEB}","name":"jeb_"}}]}}}}"#
    ))
    .await;
    let app = setup_wired(port).await;

    // WHEN: Kicking jeb_
    let (status, _) = call(
        &app,
        "POST",
        "/kick",
        Some(json!({ "uuid": JEB, "reason": "take a break" })),
    )
    .await;

    // THEN: Presence came over the wire and the kick was sent
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.daemon.commands(SERVER), vec!["kick jeb_ take a break"]);
}

#[tokio::test]
async fn test_live_action_on_unreachable_server() {
    // GIVEN: The server does not answer pings
    let app = setup().await;

    // WHEN: Whispering to a player
    let (status, body) = call(
        &app,
        "POST",
        "/whisper",
        Some(json!({ "uuid": JEB, "message": "hi" })),
    )
    .await;

    // THEN: Should return 400 Server is offline
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Server is offline");
}

#[tokio::test]
async fn test_clear_kill_whisper_and_ban_ip_player() {
    // GIVEN: Notch is online
    let app = setup().await;
    app.ping.set_online(&[(NOTCH, "Notch")]);

    // WHEN: Running every live action on Notch
    let player = json!({ "uuid": NOTCH });
    let (clear, _) = call(&app, "POST", "/clear", Some(player.clone())).await;
    let (kill, _) = call(&app, "POST", "/kill", Some(player)).await;
    let (whisper, _) = call(
        &app,
        "POST",
        "/whisper",
        Some(json!({ "uuid": NOTCH, "message": "hello" })),
    )
    .await;
    let (ban_ip, _) = call(
        &app,
        "PUT",
        "/ban-ip-player",
        Some(json!({ "uuid": NOTCH, "reason": "ban evasion" })),
    )
    .await;

    // THEN: All succeed in order
    assert_eq!(clear, StatusCode::OK);
    assert_eq!(kill, StatusCode::OK);
    assert_eq!(whisper, StatusCode::OK);
    assert_eq!(ban_ip, StatusCode::OK);
    assert_eq!(
        app.daemon.commands(SERVER),
        vec!["clear Notch", "kill Notch", "tell Notch hello", "ban-ip Notch ban evasion"]
    );
}

#[tokio::test]
async fn test_wipe_offline_player() {
    // GIVEN: jeb_ is offline with saved data in two worlds
    let app = setup().await;
    app.ping.set_online(&[]);
    app.daemon
        .put_file(SERVER, &format!("/world/playerdata/{JEB}.dat"), "data");
    app.daemon
        .put_file(SERVER, &format!("/world_nether/playerdata/{JEB}.dat_old"), "data");

    // WHEN: Wiping jeb_
    let (status, _) = call(&app, "POST", "/wipe", Some(json!({ "uuid": JEB }))).await;

    // THEN: Both files are gone and no kick was sent
    assert_eq!(status, StatusCode::OK);
    assert!(app.daemon.file(SERVER, &format!("/world/playerdata/{JEB}.dat")).is_none());
    assert!(
        app.daemon
            .file(SERVER, &format!("/world_nether/playerdata/{JEB}.dat_old"))
            .is_none()
    );
    assert!(app.daemon.commands(SERVER).is_empty());
}

// =============================================================================
// ACTIVITY TESTS
// =============================================================================

#[tokio::test]
async fn test_activity_lists_newest_first() {
    // GIVEN: Two recorded actions
    let app = setup().await;
    call(&app, "PUT", "/ban-ip", Some(json!({ "ip": "10.0.0.1" }))).await;
    call(&app, "DELETE", "/ban-ip", Some(json!({ "ip": "10.0.0.1" }))).await;

    // WHEN: Reading the activity log with a limit of one
    let (status, body) = call(&app, "GET", "/activity?limit=1", None).await;

    // THEN: Only the latest event is returned
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "server:player.unban-ip");
    assert_eq!(events[0]["properties"]["ip"], "10.0.0.1");
}

#[tokio::test]
async fn test_activity_requires_token() {
    // GIVEN: A running application
    let app = setup().await;

    // WHEN: Reading activity with a wrong token
    let (status, _) = send_request(
        &app,
        "GET",
        &format!("/servers/{SERVER}/activity"),
        None,
        Some(&format!("{TOKEN}-wrong")),
    )
    .await;

    // THEN: Should return 401
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
