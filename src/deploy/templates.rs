//! Files and shell commands sent to the target host.
//!
//! File contents are rendered with Tera and written through the remote
//! session. Every value interpolated into a command line is shell-quoted.

use crate::configuration::DeploySettings;
use serde::Serialize;
use shell_words::quote;
use tera::{Context, Tera};

pub const NGINX_SITES_AVAILABLE: &str = "/etc/nginx/sites-available";
pub const NGINX_SITES_ENABLED: &str = "/etc/nginx/sites-enabled";

const ENV_FILE_TEMPLATE: &str = r#"# Managed by deployer, overwritten on every deployment
{% for var in variables -%}
{{ var.name }}={{ var.value }}
{% endfor -%}
NODE_ENV=production
PORT={{ app_port }}
"#;

// certbot --nginx --redirect adds the 443 server block and the HTTP redirect
const NGINX_VHOST_TEMPLATE: &str = r#"server {
    listen 80;
    listen [::]:80;
    server_name {{ domain }} www.{{ domain }};

    add_header X-Frame-Options "SAMEORIGIN" always;
    add_header X-XSS-Protection "1; mode=block" always;
    add_header X-Content-Type-Options "nosniff" always;
    add_header Referrer-Policy "no-referrer-when-downgrade" always;
    add_header Content-Security-Policy "default-src 'self' http: https: data: blob: 'unsafe-inline'" always;

    gzip on;
    gzip_vary on;
    gzip_min_length 1024;
    gzip_types text/plain text/css text/xml text/javascript application/javascript application/xml+rss application/json;

    location / {
        proxy_pass http://localhost:{{ app_port }};
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection 'upgrade';
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_cache_bypass $http_upgrade;
        proxy_read_timeout 86400;
    }

    location ~* \.(jpg|jpeg|png|gif|ico|css|js)$ {
        proxy_pass http://localhost:{{ app_port }};
        expires 1y;
        add_header Cache-Control "public, immutable";
    }
}
"#;

#[derive(Debug, Serialize)]
struct EnvVar {
    name: String,
    value: String,
}

/// Env file ready to upload. `skipped` lists forwarded names unset locally.
#[derive(Debug)]
pub struct EnvFile {
    pub contents: String,
    pub skipped: Vec<String>,
}

pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template("env.tera", ENV_FILE_TEMPLATE)?;
        tera.add_raw_template("nginx.conf.tera", NGINX_VHOST_TEMPLATE)?;
        Ok(Self { tera })
    }

    /// Render the remote `.env` from the configured forwarded variables.
    pub fn env_file<F>(&self, settings: &DeploySettings, lookup: F) -> Result<EnvFile, tera::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut variables = Vec::new();
        let mut skipped = Vec::new();
        for name in &settings.forwarded_env {
            match lookup(name) {
                Some(value) => variables.push(EnvVar {
                    name: name.clone(),
                    value: dotenv_quote(&value),
                }),
                None => skipped.push(name.clone()),
            }
        }

        let mut context = Context::new();
        context.insert("variables", &variables);
        context.insert("app_port", &settings.app_port);

        Ok(EnvFile {
            contents: self.tera.render("env.tera", &context)?,
            skipped,
        })
    }

    pub fn nginx_vhost(&self, domain: &str, app_port: u16) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("domain", domain);
        context.insert("app_port", &app_port);
        self.tera.render("nginx.conf.tera", &context)
    }
}

/// Double-quoted dotenv value; backslashes, quotes, `$` and newlines are escaped.
fn dotenv_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

pub fn remote_join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

pub fn vhost_path(app_name: &str) -> String {
    remote_join(NGINX_SITES_AVAILABLE, app_name)
}

pub fn make_dir(path: &str) -> String {
    format!("mkdir -p {}", quote(path))
}

pub fn extract_archive(dir: &str, archive: &str) -> String {
    format!("cd {} && tar -xzf {}", quote(dir), quote(archive))
}

pub fn install_dependencies(dir: &str) -> String {
    format!("cd {} && npm ci --production", quote(dir))
}

pub fn ensure_process_manager() -> String {
    "command -v pm2 >/dev/null 2>&1 || npm install -g pm2".to_string()
}

/// Replace any running instance of `app_name` and persist the process list.
pub fn restart_service(dir: &str, app_name: &str, entrypoint: &str) -> String {
    format!(
        "cd {dir} && (pm2 delete {name} >/dev/null 2>&1 || true) && pm2 start {entry} --name {name} && pm2 save",
        dir = quote(dir),
        name = quote(app_name),
        entry = quote(entrypoint),
    )
}

pub fn install_proxy_tooling() -> String {
    "apt-get update && DEBIAN_FRONTEND=noninteractive apt-get install -y nginx certbot python3-certbot-nginx"
        .to_string()
}

pub fn enable_site(app_name: &str) -> String {
    format!(
        "ln -sf {} {} && rm -f {}",
        quote(&vhost_path(app_name)),
        quote(&remote_join(NGINX_SITES_ENABLED, app_name)),
        quote(&remote_join(NGINX_SITES_ENABLED, "default")),
    )
}

pub fn test_proxy_config() -> String {
    "nginx -t".to_string()
}

pub fn reload_proxy() -> String {
    "systemctl enable nginx && systemctl reload-or-restart nginx".to_string()
}

pub fn request_certificate(domain: &str, email: &str) -> String {
    format!(
        "certbot --nginx -d {} -d {} --non-interactive --agree-tos --email {} --redirect",
        quote(domain),
        quote(&format!("www.{}", domain)),
        quote(email),
    )
}

pub fn enable_renewal_timer() -> String {
    "systemctl enable certbot.timer && systemctl start certbot.timer".to_string()
}

pub fn remove_file(path: &str) -> String {
    format!("rm -f {}", quote(path))
}

pub fn whoami() -> String {
    "whoami".to_string()
}
