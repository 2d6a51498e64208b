use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use log::{info, warn};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RANGE;

use crate::utils::pb_style;

/// 下载文件到指定路径，支持断点续传
///
/// 目标文件已存在时直接返回，不发起任何网络请求。
/// 数据先写入 `<目标>.part`，全部完成后原子重命名；
/// 中途断开会保留 part 文件，下次运行通过 Range 请求从断点继续。
pub fn download_with_resume(client: &Client, url: &str, dest: &Path) -> Result<()> {
    if dest.exists() {
        info!("文件已存在，跳过下载: {}", dest.display());
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("无法创建下载目录: {}", parent.display()))?;
    }

    let part = part_path(dest);
    let mut offset = match fs::metadata(&part) {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };

    let mut request = client.get(url);
    if offset > 0 {
        info!("从 {offset} 字节处继续下载");
        request = request.header(RANGE, format!("bytes={offset}-"));
    }
    let response = request.send().with_context(|| format!("请求失败: {url}"))?;

    // 上次运行可能写完了全部内容但没来得及重命名，此时断点等于文件总长，
    // 服务器会返回 416，直接把断点文件转正
    if offset > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        fs::rename(&part, dest)
            .with_context(|| format!("无法保存下载文件: {}", dest.display()))?;
        info!("断点文件已完整，直接保存: {}", dest.display());
        return Ok(());
    }
    let mut response =
        response.error_for_status().with_context(|| format!("请求失败: {url}"))?;

    // 服务器不支持 Range 时会返回 200 和完整内容，丢弃断点重新下载
    if offset > 0 && response.status() != StatusCode::PARTIAL_CONTENT {
        warn!("服务器不支持断点续传，重新下载完整文件");
        fs::remove_file(&part)
            .with_context(|| format!("无法删除断点文件: {}", part.display()))?;
        offset = 0;
    }

    let total = response.content_length().map(|len| offset + len);
    let pb = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::no_length(),
    };
    let pb = pb.with_style(pb_style());
    pb.set_position(offset);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&part)
        .with_context(|| format!("无法打开断点文件: {}", part.display()))?;

    let mut buf = [0u8; 8192];
    loop {
        let n = response.read(&mut buf).context("下载中断")?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .with_context(|| format!("无法写入断点文件: {}", part.display()))?;
        pb.inc(n as u64);
    }
    file.flush()?;
    drop(file);
    pb.finish_and_clear();

    // 已知总长度时校验完整性，不完整则保留 part 文件等待续传
    if let Some(total) = total {
        let written = fs::metadata(&part)?.len();
        if written < total {
            bail!("下载不完整: {written}/{total} 字节，下次运行将从断点继续");
        }
    }

    fs::rename(&part, dest)
        .with_context(|| format!("无法保存下载文件: {}", dest.display()))?;
    info!("下载完成: {}", dest.display());
    Ok(())
}

fn part_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// 从 URL 中取出文件名，用作默认的保存名称
pub fn file_name_of(url: &str) -> Result<&str> {
    let name = url.split('/').next_back().unwrap_or_default();
    if name.is_empty() {
        bail!("无法从 URL 推断文件名: {url}");
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    use super::*;

    /// 单次请求的极简 HTTP 服务器，支持 Range，并把收到的 Range 头发回测试线程
    fn serve_once(body: Vec<u8>, ranges: mpsc::Sender<Option<u64>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut range = None;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(rest) = line.to_lowercase().strip_prefix("range: bytes=") {
                    range = rest.trim().trim_end_matches('-').parse::<u64>().ok();
                }
                if line == "\r\n" {
                    break;
                }
            }
            ranges.send(range).unwrap();

            let start = range.unwrap_or(0) as usize;
            if start >= body.len() {
                let header = format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\n\r\n",
                    body.len()
                );
                reader.into_inner().write_all(header.as_bytes()).unwrap();
                return;
            }
            let chunk = &body[start..];
            let header = match range {
                Some(_) => format!(
                    "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
                    chunk.len(),
                    start,
                    body.len() - 1,
                    body.len()
                ),
                None => format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", chunk.len()),
            };
            let mut stream = reader.into_inner();
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(chunk).unwrap();
        });
        format!("http://{addr}/weights.bin")
    }

    #[test]
    fn test_fresh_download() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("weights.bin");
        let body: Vec<u8> = (0..=255).collect();
        let (tx, rx) = mpsc::channel();
        let url = serve_once(body.clone(), tx);

        download_with_resume(&Client::new(), &url, &dest).unwrap();

        assert_eq!(rx.recv().unwrap(), None);
        assert_eq!(fs::read(&dest).unwrap(), body);
        assert!(!dir.path().join("weights.bin.part").exists());
    }

    /// 断点文件有 k 字节时必须请求 [k, N)，最终文件逐字节等于完整内容
    #[test]
    fn test_resume_from_partial() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("weights.bin");
        let body: Vec<u8> = (0..200u32).map(|i| (i % 256) as u8).collect();
        fs::write(dir.path().join("weights.bin.part"), &body[..77]).unwrap();

        let (tx, rx) = mpsc::channel();
        let url = serve_once(body.clone(), tx);
        download_with_resume(&Client::new(), &url, &dest).unwrap();

        assert_eq!(rx.recv().unwrap(), Some(77));
        assert_eq!(fs::read(&dest).unwrap(), body);
    }

    /// 断点文件已经包含全部内容（重命名前崩溃）时，服务器返回 416，
    /// 文件应当直接转正而不是反复报错
    #[test]
    fn test_completed_part_is_finalized() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("weights.bin");
        let body: Vec<u8> = (0..150u32).map(|i| (i % 256) as u8).collect();
        fs::write(dir.path().join("weights.bin.part"), &body).unwrap();

        let (tx, rx) = mpsc::channel();
        let url = serve_once(body.clone(), tx);
        download_with_resume(&Client::new(), &url, &dest).unwrap();

        assert_eq!(rx.recv().unwrap(), Some(150));
        assert_eq!(fs::read(&dest).unwrap(), body);
        assert!(!dir.path().join("weights.bin.part").exists());
    }

    #[test]
    fn test_existing_file_short_circuits() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("weights.bin");
        fs::write(&dest, b"done").unwrap();

        // URL 无效也不报错，因为根本不会发请求
        download_with_resume(&Client::new(), "http://127.0.0.1:1/x", &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"done");
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("http://a/b/weights.h5").unwrap(), "weights.h5");
        assert!(file_name_of("http://a/b/").is_err());
    }
}
