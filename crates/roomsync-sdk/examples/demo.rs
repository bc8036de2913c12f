use roomsync_sdk::{Result, RoomSyncConfig, RoomSyncSDK, SdkEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 RoomSync SDK 演示");
    println!("==============================================\n");

    // 示例1：SDK 初始化和配置
    println!("📋 示例1: SDK 初始化和配置");

    let config = RoomSyncConfig::builder()
        .base_url("http://127.0.0.1:3000")
        .data_dir("./roomsync-demo-data")
        .local_user_uuid("you")
        .poll_interval_secs(5)
        .build();

    let sdk = RoomSyncSDK::initialize(config).await?;
    println!("✅ SDK 初始化成功");
    println!("   快照恢复消息数: {}", sdk.messages().await.len());

    // 示例2：订阅事件
    println!("\n⚙️ 示例2: 订阅 SDK 事件");
    let mut events = sdk.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("   [事件] {}", event.event_type());
            if let SdkEvent::StoreReset { new_epoch, .. } = event {
                println!("   [事件] 远端已重建, 新 epoch: {}", new_epoch);
            }
        }
    });

    // 示例3：bootstrap 全量对齐
    println!("\n🔄 示例3: bootstrap 全量对齐远端");
    match sdk.bootstrap().await {
        Ok(_) => {
            println!("✅ bootstrap 成功");
            println!("   epoch: {:?}", sdk.epoch().await);
            println!("   消息数: {}", sdk.messages().await.len());
            println!("   参与者数: {}", sdk.participants().await.len());
        }
        Err(e) => {
            println!("❌ bootstrap 失败: {}", e);
            println!("   （请确认远端服务已在 base_url 上运行）");
            sdk.shutdown().await?;
            return Err(e);
        }
    }

    // 示例4：启动增量同步循环
    println!("\n📡 示例4: 启动增量同步循环");
    sdk.start_sync().await?;
    println!("✅ 同步循环已启动");

    // 示例5：乐观发送
    println!("\n📤 示例5: 乐观发送消息");
    match sdk.send_message("你好，这是一条演示消息！").await {
        Ok(Some(message)) => println!("✅ 发送成功, 服务端 ID: {}", message.uuid),
        Ok(None) => println!("   空白输入被忽略"),
        Err(e) => {
            println!("❌ 发送失败: {}", e);
            for pending in sdk.pending_sends().await {
                println!("   在途发送: {} ({:?})", pending.provisional_uuid, pending.state);
            }
        }
    }

    // 示例6：观察几个同步周期
    println!("\n📊 示例6: 观察同步周期");
    for _ in 0..3 {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        println!(
            "   watermark={}, 消息数={}, 错误={:?}",
            sdk.watermark().await,
            sdk.messages().await.len(),
            sdk.last_error().await
        );
    }

    // 示例7：关闭
    println!("\n🔌 示例7: 关闭 SDK");
    sdk.shutdown().await?;
    println!("✅ 已关闭");

    Ok(())
}
