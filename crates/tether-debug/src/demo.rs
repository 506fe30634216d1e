//! A small debuggee the `tether` binary runs when no other program is given.
//!
//! `demo.Main.main` opens an account, makes a few deposits in a loop and a
//! withdrawal, so there is something to break on and step through.

use tether_runtime::{CallContext, ClassDef, LocalVm, ObjectRef, Thrown, Value};

pub const MAIN_CLASS: &str = "demo.Main";
pub const ACCOUNT_CLASS: &str = "demo.Account";

fn receiver(ctx: &CallContext<'_>) -> Result<ObjectRef, Thrown> {
    ctx.this()
        .ok_or_else(|| ctx.throw("NullPointerException", "no receiver"))
}

fn account() -> ClassDef {
    ClassDef::builder(ACCOUNT_CLASS)
        .source_file("Account.java")
        .field("owner", "String")
        .field("balance", "int")
        .static_field("opened", "int")
        .constructor(
            &[("owner", "String"), ("balance", "int")],
            [5, 6, 7],
            |ctx, args| {
                ctx.line(5)?;
                let this = receiver(ctx)?;
                ctx.set_field(&this, "owner", args[0].clone())?;
                ctx.line(6)?;
                ctx.set_field(&this, "balance", args[1].clone())?;
                ctx.line(7)?;
                let opened = ctx
                    .get_static(ACCOUNT_CLASS, "opened")?
                    .as_int()
                    .unwrap_or(0);
                ctx.set_static(ACCOUNT_CLASS, "opened", opened + 1)?;
                Ok(Value::Void)
            },
        )
        .method("deposit", &[("amount", "int")], "int", [10, 11, 12], |ctx, args| {
            ctx.line(10)?;
            let this = receiver(ctx)?;
            let amount = args[0].as_int().unwrap_or(0);
            ctx.line(11)?;
            let balance = ctx.get_field(&this, "balance")?.as_int().unwrap_or(0) + amount;
            ctx.set_local("balance", balance);
            ctx.line(12)?;
            ctx.set_field(&this, "balance", balance)?;
            Ok(Value::from(balance))
        })
        .method(
            "withdraw",
            &[("amount", "int")],
            "int",
            [15, 16, 17, 18],
            |ctx, args| {
                ctx.line(15)?;
                let this = receiver(ctx)?;
                let amount = args[0].as_int().unwrap_or(0);
                let balance = ctx.get_field(&this, "balance")?.as_int().unwrap_or(0);
                ctx.line(16)?;
                if amount > balance {
                    ctx.line(17)?;
                    return Err(ctx.throw("IllegalStateException", "insufficient funds"));
                }
                ctx.line(18)?;
                ctx.set_field(&this, "balance", balance - amount)?;
                Ok(Value::from(balance - amount))
            },
        )
        .build()
}

fn main_class() -> ClassDef {
    ClassDef::builder(MAIN_CLASS)
        .source_file("Main.java")
        .static_method("main", &[("args", "String[]")], "void", [3, 4, 5, 6, 7], |ctx, _| {
            ctx.line(3)?;
            let owner = ctx.new_string("ada");
            let account = ctx.new_object(ACCOUNT_CLASS, &[owner, Value::from(10)])?;
            ctx.set_local("account", account.clone());
            let account = ctx.require_object(&account)?;
            for round in 1..=3 {
                ctx.set_local("round", round);
                ctx.line(4)?;
                ctx.invoke_virtual(&account, "deposit", &[Value::from(round * 5)])?;
            }
            ctx.line(5)?;
            ctx.invoke_virtual(&account, "withdraw", &[Value::from(20)])?;
            ctx.line(6)?;
            let balance = ctx.get_field(&account, "balance")?;
            ctx.set_local("balance", balance);
            ctx.line(7)?;
            Ok(Value::Void)
        })
        .build()
}

/// Load the demo classes into `vm`.
pub fn install(vm: &LocalVm) {
    vm.define_class(account());
    vm.define_class(main_class());
}
