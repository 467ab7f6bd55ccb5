// src/handlers/ui.rs
use crate::project::preview::{PREVIEW_ERROR_MESSAGE, SANDBOX_PERMISSIONS};
use axum::{extract::Path, response::Html, routing::get, Router};

pub fn ui_routes() -> Router {
    Router::new()
        .route("/", get(home_page))
        .route("/dashboard/:id", get(dashboard_page))
}

const BASE_STYLE: &str = r#"
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #0f1117; color: #e6e6e6; }
        a { color: #7dd3fc; }
        button { background: #7c3aed; color: white; border: none; border-radius: 6px; padding: 8px 14px; cursor: pointer; }
        button:disabled { opacity: 0.5; cursor: wait; }
        input, textarea, select { background: #1a1d27; color: #e6e6e6; border: 1px solid #2d3140; border-radius: 6px; padding: 8px; }
        .error { color: #f87171; min-height: 1.2em; }
"#;

pub async fn home_page() -> Html<String> {
    let html = r###"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>🐉 Libelula - Describe it, see it</title>
    <style>__BASE_STYLE__
        main { max-width: 720px; margin: 48px auto; padding: 0 16px; }
        h1 { margin-bottom: 8px; }
        section { background: #161923; border-radius: 10px; padding: 20px; margin-top: 24px; }
        form { display: flex; flex-direction: column; gap: 10px; }
        .row { display: flex; gap: 10px; align-items: center; }
        ul { list-style: none; margin-top: 12px; }
        li { padding: 8px 0; border-bottom: 1px solid #232736; display: flex; justify-content: space-between; }
        #notice { color: #86efac; }
    </style>
</head>
<body>
<main>
    <h1>🐉 Libelula</h1>
    <p>Describe a UI in plain words and watch it render.</p>
    <p id="notice"></p>

    <section id="auth">
        <form id="login-form">
            <h2>Sign in</h2>
            <input name="email" type="email" placeholder="Email" required>
            <input name="password" type="password" placeholder="Password" required>
            <button type="submit">Sign in</button>
        </form>
        <form id="register-form" style="margin-top: 24px;">
            <h2>Create an account</h2>
            <input name="name" placeholder="Name" required>
            <input name="email" type="email" placeholder="Email" required>
            <input name="password" type="password" placeholder="Password (6+ characters)" required>
            <button type="submit">Register</button>
        </form>
        <p class="error" id="auth-error"></p>
    </section>

    <section id="chats" style="display: none;">
        <div class="row" style="justify-content: space-between;">
            <h2>Your projects</h2>
            <span id="tokens"></span>
        </div>
        <div class="row" style="margin-top: 12px;">
            <input id="chat-name" placeholder="Project name (optional)" style="flex: 1;">
            <button id="new-chat">New chat</button>
            <button id="logout" style="background: #374151;">Sign out</button>
        </div>
        <ul id="chat-list"></ul>
    </section>
</main>
<script>
    const params = new URLSearchParams(location.search);
    if (params.get('verified') === 'true') document.getElementById('notice').textContent = 'E-mail verified. You can sign in now.';
    if (params.get('error')) document.getElementById('auth-error').textContent = 'Verification link is invalid or expired.';

    const api = async (path, options = {}) => {
        const token = localStorage.getItem('libelula_token');
        const headers = Object.assign({ 'Content-Type': 'application/json' }, options.headers || {});
        if (token) headers['Authorization'] = 'Bearer ' + token;
        const res = await fetch(path, Object.assign({}, options, { headers }));
        const body = await res.json().catch(() => ({}));
        if (!res.ok) throw new Error(body.message || ('Request failed (' + res.status + ')'));
        return body;
    };

    const formJson = (form) => JSON.stringify(Object.fromEntries(new FormData(form)));

    document.getElementById('login-form').addEventListener('submit', async (e) => {
        e.preventDefault();
        try {
            const body = await api('/api/auth/login', { method: 'POST', body: formJson(e.target) });
            localStorage.setItem('libelula_token', body.token);
            showChats();
        } catch (err) { document.getElementById('auth-error').textContent = err.message; }
    });

    document.getElementById('register-form').addEventListener('submit', async (e) => {
        e.preventDefault();
        try {
            const body = await api('/api/auth/register', { method: 'POST', body: formJson(e.target) });
            document.getElementById('notice').textContent = body.message;
            e.target.reset();
        } catch (err) { document.getElementById('auth-error').textContent = err.message; }
    });

    document.getElementById('new-chat').addEventListener('click', async () => {
        const name = document.getElementById('chat-name').value.trim();
        const chat = await api('/api/chats', { method: 'POST', body: JSON.stringify(name ? { name } : {}) });
        location.href = '/dashboard/' + encodeURIComponent(chat.id);
    });

    document.getElementById('logout').addEventListener('click', () => {
        localStorage.removeItem('libelula_token');
        location.reload();
    });

    async function showChats() {
        try {
            const [chats, balance] = await Promise.all([api('/api/chats'), api('/api/user/tokens')]);
            document.getElementById('auth').style.display = 'none';
            document.getElementById('chats').style.display = 'block';
            document.getElementById('tokens').textContent = '🪙 ' + balance.tokens + ' tokens';
            const list = document.getElementById('chat-list');
            list.innerHTML = '';
            for (const chat of chats) {
                const item = document.createElement('li');
                const link = document.createElement('a');
                link.href = '/dashboard/' + encodeURIComponent(chat.id);
                link.textContent = chat.name;
                const when = document.createElement('small');
                when.textContent = new Date(chat.updated_at).toLocaleString();
                item.append(link, when);
                list.appendChild(item);
            }
        } catch (err) {
            localStorage.removeItem('libelula_token');
        }
    }

    if (localStorage.getItem('libelula_token')) showChats();
</script>
</body>
</html>"###;

    Html(html.replace("__BASE_STYLE__", BASE_STYLE))
}

pub async fn dashboard_page(Path(chat_id): Path<String>) -> Html<String> {
    let html = r###"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>🐉 Libelula - Workspace</title>
    <style>__BASE_STYLE__
        .layout { display: grid; grid-template-columns: 320px 1fr; height: 100vh; }
        aside { background: #161923; padding: 16px; display: flex; flex-direction: column; gap: 12px; overflow-y: auto; }
        aside textarea { min-height: 120px; resize: vertical; }
        .workspace { display: flex; flex-direction: column; padding: 12px; gap: 8px; min-width: 0; }
        .toolbar { display: flex; gap: 8px; align-items: center; }
        .toolbar .spacer { flex: 1; }
        .view { flex: 1; display: none; min-height: 0; }
        .view.active { display: flex; }
        #preview-view iframe { flex: 1; background: white; border: none; border-radius: 8px; }
        #code-view { gap: 8px; }
        #tree { width: 260px; overflow: auto; background: #161923; border-radius: 8px; padding: 8px; font-size: 14px; }
        #tree .node { cursor: pointer; padding: 2px 4px; border-radius: 4px; white-space: nowrap; }
        #tree .node.selected { background: #312e81; }
        #tree ul { list-style: none; padding-left: 14px; }
        #editor { flex: 1; font-family: ui-monospace, Menlo, monospace; font-size: 13px; resize: none; }
        .spinner { display: none; }
        .generating .spinner { display: inline; }
    </style>
</head>
<body>
<div class="layout">
    <aside>
        <a href="/">← Projects</a>
        <h2 id="chat-name">Workspace</h2>
        <textarea id="prompt" placeholder="Describe the UI you want, or what to change..."></textarea>
        <select id="backend">
            <option value="files">Gemini · multi-file</option>
            <option value="legacy">Gemini · single component</option>
            <option value="workflow">Workflow (asynchronous)</option>
        </select>
        <button id="generate">Generate <span class="spinner">⏳</span></button>
        <button id="cancel" style="display: none; background: #374151;">Stop waiting</button>
        <p class="error" id="error"></p>
        <small id="tokens"></small>
    </aside>
    <div class="workspace">
        <div class="toolbar">
            <button data-view="preview-view">👁 Preview</button>
            <button data-view="code-view">⌨ Code</button>
            <span class="spacer"></span>
            <button id="export">📦 Export zip</button>
        </div>
        <div id="preview-view" class="view active">
            <iframe id="preview" title="preview" sandbox="__SANDBOX__"></iframe>
        </div>
        <div id="code-view" class="view">
            <div id="tree"></div>
            <textarea id="editor" spellcheck="false"></textarea>
        </div>
    </div>
</div>
<script>
    const CHAT_ID = __CHAT_ID__;
    const PREVIEW_ERROR = '__PREVIEW_ERROR__';
    const token = localStorage.getItem('libelula_token');
    if (!token) location.href = '/';

    const $ = (id) => document.getElementById(id);
    const chatPath = '/api/chats/' + encodeURIComponent(CHAT_ID);
    let workspace = null;
    let editTimer = null;

    const api = async (path, options = {}) => {
        const headers = Object.assign({ 'Authorization': 'Bearer ' + token, 'Content-Type': 'application/json' }, options.headers || {});
        const res = await fetch(path, Object.assign({}, options, { headers }));
        if (!res.ok) {
            const body = await res.json().catch(() => ({}));
            throw new Error(body.message || ('Request failed (' + res.status + ')'));
        }
        return res;
    };

    function renderTree(nodes, container) {
        const list = document.createElement('ul');
        for (const node of nodes) {
            const item = document.createElement('li');
            const label = document.createElement('div');
            label.className = 'node' + (workspace && node.path === workspace.selected_path ? ' selected' : '');
            label.textContent = (node.type === 'folder' ? '📁 ' : '📄 ') + node.name;
            item.appendChild(label);
            if (node.type === 'folder') {
                renderTree(node.children || [], item);
            } else {
                label.addEventListener('click', () => selectFile(node.path));
            }
            list.appendChild(item);
        }
        container.appendChild(list);
    }

    async function refreshPreview() {
        const res = await api(chatPath + '/preview');
        $('preview').srcdoc = await res.text();
    }

    async function refresh() {
        workspace = await (await api(chatPath + '/workspace')).json();
        $('tree').innerHTML = '';
        renderTree(workspace.tree, $('tree'));
        if (document.activeElement !== $('editor')) $('editor').value = workspace.selected_content || '';
        $('error').textContent = workspace.error || '';
        document.body.classList.toggle('generating', workspace.generating);
        $('generate').disabled = workspace.generating;
        $('cancel').style.display = workspace.generating && $('backend').value === 'workflow' ? 'block' : 'none';
        await refreshPreview();
        const balance = await (await api('/api/user/tokens')).json();
        $('tokens').textContent = '🪙 ' + balance.tokens + ' tokens';
    }

    async function selectFile(path) {
        const file = await (await api(chatPath + '/files/' + path.split('/').map(encodeURIComponent).join('/'))).json();
        workspace.selected_path = file.path;
        $('editor').value = file.content;
        $('tree').innerHTML = '';
        renderTree(workspace.tree, $('tree'));
    }

    $('editor').addEventListener('input', () => {
        clearTimeout(editTimer);
        editTimer = setTimeout(async () => {
            if (!workspace || !workspace.selected_path) return;
            const res = await api(chatPath + '/files', {
                method: 'PUT',
                body: JSON.stringify({ path: workspace.selected_path, content: $('editor').value }),
            });
            const body = await res.json();
            if (body.preview_slot) await refreshPreview();
        }, 400);
    });

    $('generate').addEventListener('click', async () => {
        const prompt = $('prompt').value.trim();
        if (!prompt) return;
        $('error').textContent = '';
        $('generate').disabled = true;
        document.body.classList.add('generating');
        try {
            const backend = $('backend').value;
            if (backend === 'workflow') {
                await api(chatPath + '/generate-async', { method: 'POST', body: JSON.stringify({ prompt }) });
                $('cancel').style.display = 'block';
            } else {
                const body = await (await api('/api/generate', {
                    method: 'POST',
                    body: JSON.stringify({ chatId: CHAT_ID, prompt, mode: backend }),
                })).json();
                $('chat-name').textContent = body.name;
                await refresh();
            }
        } catch (err) {
            $('error').textContent = err.message;
            $('generate').disabled = false;
            document.body.classList.remove('generating');
        }
    });

    $('cancel').addEventListener('click', () => api(chatPath + '/generation', { method: 'DELETE' }).catch(() => {}));

    $('export').addEventListener('click', async () => {
        const blob = await (await api(chatPath + '/export')).blob();
        const link = document.createElement('a');
        link.href = URL.createObjectURL(blob);
        link.download = 'libelula-nextjs-project.zip';
        link.click();
        URL.revokeObjectURL(link.href);
    });

    document.querySelectorAll('[data-view]').forEach((button) => button.addEventListener('click', () => {
        document.querySelectorAll('.view').forEach((view) => view.classList.toggle('active', view.id === button.dataset.view));
    }));

    window.addEventListener('message', (event) => {
        if (event.source === $('preview').contentWindow && event.data && event.data.type === PREVIEW_ERROR) {
            $('error').textContent = 'Preview error: ' + event.data.message;
        }
    });

    function connect() {
        const scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
        const socket = new WebSocket(scheme + location.host + '/ws/chats/' + encodeURIComponent(CHAT_ID) + '?token=' + encodeURIComponent(token));
        socket.onmessage = (message) => {
            const event = JSON.parse(message.data);
            if (['generation_completed', 'generation_failed', 'generation_cancelled', 'resync'].includes(event.type)) refresh();
            if (event.type === 'generation_started') document.body.classList.add('generating');
        };
        socket.onclose = () => setTimeout(connect, 3000);
    }

    api(chatPath).then((res) => res.json()).then((chat) => { $('chat-name').textContent = chat.name; });
    refresh().catch((err) => { $('error').textContent = err.message; });
    connect();
</script>
</body>
</html>"###;

    Html(
        html.replace("__BASE_STYLE__", BASE_STYLE)
            .replace("__SANDBOX__", SANDBOX_PERMISSIONS)
            .replace("__PREVIEW_ERROR__", PREVIEW_ERROR_MESSAGE)
            .replace("__CHAT_ID__", &js_string_literal(&chat_id)),
    )
}

/// JSON string literal that is also safe inside an inline `<script>`.
fn js_string_literal(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
}
