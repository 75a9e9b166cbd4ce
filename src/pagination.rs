use crate::error::{Error, Result};
use crate::models::{CursorPage, OffsetPage, TokenPage};
use std::future::Future;

/// オフセットページネーションの駆動ループ
///
/// 完了判定は封筒レスポンスの`isLast`フラグ、フラグを持たない
/// 配列ルートのエンドポイントでは件数 < ページサイズ。完了シグナルの
/// 後は一切リクエストを発行しない。
pub async fn collect_offset_pages<T, F, Fut>(page_size: u32, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<OffsetPage<T>>>,
{
    let mut offset = 0;
    let mut items = Vec::new();

    loop {
        let page = fetch(offset).await?;
        let count = page.values.len();
        items.extend(page.values);

        let is_complete = match page.is_last {
            Some(flag) => flag,
            None => count < page_size as usize,
        };

        if is_complete {
            break;
        }

        offset += page_size;
    }

    Ok(items)
}

/// カーソル（since/until）ページネーションの駆動ループ
///
/// `last_page`がtrueになるまで、各レスポンスの`until`を次のカーソル
/// として進める。
pub async fn collect_cursor_pages<T, F, Fut>(initial: i64, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<CursorPage<T>>>,
{
    let mut cursor = initial;
    let mut items = Vec::new();

    loop {
        let page = fetch(cursor).await?;
        items.extend(page.values);

        if page.last_page {
            break;
        }

        cursor = page.until.ok_or_else(|| {
            Error::InvalidData("Missing until cursor on a non-final page".to_string())
        })?;
    }

    Ok(items)
}

/// 不透明トークンページネーションの駆動ループ
///
/// 明示的な`isLast`があればそれが優先、なければトークンの不在が
/// 完了シグナル。
pub async fn collect_token_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<TokenPage<T>>>,
{
    let mut token: Option<String> = None;
    let mut items = Vec::new();

    loop {
        let page = fetch(token.take()).await?;
        items.extend(page.values);

        let is_complete = match page.is_last {
            Some(flag) => flag,
            None => page.next_page_token.is_none(),
        };

        if is_complete {
            break;
        }

        token = Some(page.next_page_token.ok_or_else(|| {
            Error::InvalidData("Missing next page token on a non-final page".to_string())
        })?);
    }

    Ok(items)
}
